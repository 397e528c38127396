//! Per-connection wrapper tying the request decoder and response encoder
//! to one accepted stream.

mod http_connection;

pub use http_connection::HttpConnection;
