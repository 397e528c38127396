//! A blocking micro HTTP/1.1 wire layer
//!
//! This crate provides the wire-level half of the ember server: parsing a
//! request off a byte stream and serializing a response back onto it. It is
//! deliberately synchronous: the server above it runs one operating thread
//! per in-flight connection, so every read and write here simply blocks the
//! calling thread.
//!
//! # Features
//!
//! - HTTP/1.1 request-line and header parsing via `httparse`
//! - Fixed-length (`Content-Length`) request bodies
//! - Response serialization with automatic `Content-Length`
//! - Built-in protection against oversized or malformed header sections
//! - Generic over the underlying stream halves, so connections can be
//!   exercised against in-memory readers and writers in tests
//!
//! # Example
//!
//! ```no_run
//! use std::net::TcpListener;
//!
//! use ember_http::connection::HttpConnection;
//! use http::{Response, StatusCode};
//!
//! fn main() -> std::io::Result<()> {
//!     let listener = TcpListener::bind("127.0.0.1:8080")?;
//!     let (stream, _remote_addr) = listener.accept()?;
//!
//!     let reader = stream.try_clone()?;
//!     let mut connection = HttpConnection::new(reader, stream);
//!
//!     if let Ok(Some(request)) = connection.read_request() {
//!         let body = format!("you asked for {}\r\n", request.head.uri().path());
//!         let head = Response::builder().status(StatusCode::OK).body(()).unwrap();
//!         let _ = connection.send(head, body.as_bytes());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - [`protocol`]: request/response head types and the wire error taxonomy
//! - [`codec`]: blocking request decoding and response encoding
//! - [`connection`]: the per-connection wrapper tying both together
//!
//! # Limitations
//!
//! - HTTP/1.1 only, one request per connection (no keep-alive)
//! - No chunked transfer encoding; request bodies are `Content-Length` only
//! - Maximum header section: 8KB, maximum number of headers: 64

pub mod codec;
pub mod connection;
pub mod protocol;

mod utils;
pub(crate) use utils::ensure;
