//! HTTP response head handling implementation.
//!
//! The header portion of a response is represented with the standard
//! `http::Response` type carrying an empty body placeholder; the actual body
//! bytes travel separately and are attached at encode time.

use http::Response;

/// Type alias for HTTP response heads (status line plus headers).
pub type ResponseHead = Response<()>;
