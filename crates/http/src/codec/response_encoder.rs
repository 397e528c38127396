//! HTTP response encoder.
//!
//! Serializes the status line, header block and body bytes into a staging
//! buffer. The whole response is staged before anything touches the wire, so
//! headers are always applied ahead of the body and a response is written
//! with a single flush.

use std::io;
use std::io::Write;

use bytes::{BufMut, BytesMut};
use http::{HeaderValue, Version, header};
use tracing::error;

use crate::protocol::{ResponseHead, SendError};

/// Initial buffer size reserved for header serialization
const INIT_HEADER_SIZE: usize = 4 * 1024;

/// Encoder for HTTP responses.
///
/// The encoder sets `Content-Length` from the final body byte count
/// (overwriting any stale value) and marks the connection as closing, since
/// the server serves exactly one request per connection.
#[derive(Debug, Default)]
pub struct ResponseEncoder;

impl ResponseEncoder {
    pub fn new() -> Self {
        Self
    }

    /// Encodes a response head plus body bytes into `dst`.
    ///
    /// # Errors
    ///
    /// Returns an error if the response head carries an HTTP version other
    /// than 1.1 (the only version this server speaks).
    pub fn encode(&mut self, head: ResponseHead, body: &[u8], dst: &mut BytesMut) -> Result<(), SendError> {
        let mut head = head;

        dst.reserve(INIT_HEADER_SIZE + body.len());
        match head.version() {
            Version::HTTP_11 => {
                write!(
                    FastWrite(dst),
                    "HTTP/1.1 {} {}\r\n",
                    head.status().as_str(),
                    head.status().canonical_reason().unwrap_or("Unknown")
                )
                .map_err(SendError::io)?;
            }
            version => {
                error!(http_version = ?version, "unsupported http version");
                return Err(SendError::UnsupportedVersion(version));
            }
        }

        // The body length is authoritative at this point, whatever an
        // earlier stage may have recorded
        match head.headers_mut().get_mut(header::CONTENT_LENGTH) {
            Some(value) => *value = body.len().into(),
            None => {
                head.headers_mut().insert(header::CONTENT_LENGTH, body.len().into());
            }
        }

        if !head.headers().contains_key(header::CONNECTION) {
            const CLOSE_VALUE: HeaderValue = HeaderValue::from_static("close");
            head.headers_mut().insert(header::CONNECTION, CLOSE_VALUE);
        }

        // Write all headers
        for (header_name, header_value) in head.headers().iter() {
            dst.put_slice(header_name.as_ref());
            dst.put_slice(b": ");
            dst.put_slice(header_value.as_ref());
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");

        dst.put_slice(body);
        Ok(())
    }
}

/// Fast writer implementation for writing to BytesMut.
///
/// Avoids going through `io::Write` bounds checking for the buffer we have
/// already reserved space in.
struct FastWrite<'a>(&'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use http::{Response, StatusCode};

    use super::*;

    fn encode(head: ResponseHead, body: &[u8]) -> String {
        let mut dst = BytesMut::new();
        ResponseEncoder::new().encode(head, body, &mut dst).unwrap();
        String::from_utf8(dst.to_vec()).unwrap()
    }

    #[test]
    fn status_line_then_headers_then_body() {
        let head = Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/plain")
            .body(())
            .unwrap();

        let encoded = encode(head, b"hello");

        assert!(encoded.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(encoded.contains("content-type: text/plain\r\n"));
        assert!(encoded.contains("content-length: 5\r\n"));
        assert!(encoded.contains("connection: close\r\n"));
        assert!(encoded.ends_with("\r\n\r\nhello"));
    }

    #[test]
    fn content_length_is_overwritten_by_actual_body_size() {
        let head = Response::builder().status(StatusCode::OK).header(header::CONTENT_LENGTH, 999).body(()).unwrap();

        let encoded = encode(head, b"abc");

        assert!(encoded.contains("content-length: 3\r\n"));
        assert!(!encoded.contains("999"));
    }

    #[test]
    fn empty_body_yields_zero_content_length() {
        let head = Response::builder().status(StatusCode::NOT_FOUND).body(()).unwrap();

        let encoded = encode(head, b"");

        assert!(encoded.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(encoded.contains("content-length: 0\r\n"));
        assert!(encoded.ends_with("\r\n\r\n"));
    }

    #[test]
    fn non_http11_head_is_rejected() {
        let mut dst = BytesMut::new();
        let head = Response::builder().version(Version::HTTP_2).body(()).unwrap();

        let result = ResponseEncoder::new().encode(head, b"", &mut dst);
        assert!(matches!(result, Err(SendError::UnsupportedVersion(_))));
    }
}
