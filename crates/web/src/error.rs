//! Error taxonomy of the execution core.
//!
//! Everything below the worker pipeline boundary is expressed as a
//! `Result`; the worker converts failures into an error response (or a
//! silent abort) exactly once, so nothing here ever reaches the
//! dispatcher. Wire-level errors (`ParseError`, `SendError`) live in
//! `ember-http`.

use std::io;

use http::StatusCode;
use thiserror::Error;

use crate::body::ResponseBody;

/// A failure inside the worker pipeline.
#[derive(Error, Debug)]
pub enum WebError {
    /// A registered validator rejected the request.
    #[error("validation failed: {reason}")]
    Validation { reason: String },

    /// A route handler failed while producing a response.
    #[error("handler '{handler}' failed: {source}")]
    Handler { handler: String, source: HandlerError },

    /// The internal-redirect hop limit was exceeded.
    #[error("redirect limit of {limit} hops exceeded")]
    TooManyRedirects { limit: usize },
}

impl WebError {
    pub(crate) fn handler(name: &str, source: HandlerError) -> Self {
        Self::Handler { handler: name.to_owned(), source }
    }

    /// Converts the failure into the response the client sees.
    ///
    /// Validation failures are the client's fault; everything else becomes
    /// a generic server error that leaks no internals.
    pub(crate) fn to_response(&self) -> ResponseBody {
        match self {
            Self::Validation { reason } => ResponseBody::error_page(StatusCode::BAD_REQUEST, reason),
            _ => ResponseBody::error_page(StatusCode::INTERNAL_SERVER_ERROR, "internal server error"),
        }
    }
}

/// An error raised by a route handler.
#[derive(Error, Debug)]
#[error("{reason}")]
pub struct HandlerError {
    reason: String,
}

impl HandlerError {
    pub fn new<S: ToString>(reason: S) -> Self {
        Self { reason: reason.to_string() }
    }
}

impl From<io::Error> for HandlerError {
    fn from(e: io::Error) -> Self {
        Self::new(e)
    }
}

/// A compression failure.
///
/// Recoverable: the worker falls back to identity encoding and leaves the
/// `Content-Encoding` header unset.
#[derive(Error, Debug)]
pub enum EncodingError {
    #[error("compressor produced no output for {input_len} input bytes")]
    EmptyOutput { input_len: usize },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}
