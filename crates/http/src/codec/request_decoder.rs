//! Blocking HTTP request decoder.
//!
//! This module reads a complete request off a blocking byte stream: the
//! request line and header block up to the terminating blank line, then,
//! for methods that carry one, exactly `Content-Length` bytes of body.
//!
//! # Implementation Details
//!
//! The decoder works in stages:
//!
//! 1. Pull header lines from the reader until the blank line
//! 2. Parse the accumulated bytes using `httparse`
//! 3. Record header name/value byte ranges, then convert to a typed
//!    [`RequestHead`] without copying the header data
//! 4. Validate `Content-Length` and read the body, if the method carries one
//!
//! # Limits
//!
//! - Maximum number of headers: 64
//! - Maximum header section size: 8KB

use std::io;
use std::io::BufRead;
use std::mem::MaybeUninit;

use bytes::{Bytes, BytesMut};
use http::{HeaderName, HeaderValue, Request};
use httparse::{Error, Status};
use tracing::trace;

use crate::ensure;
use crate::protocol::{ParseError, RequestHead};

/// Maximum number of headers allowed in a request
const MAX_HEADER_NUM: usize = 64;

/// Maximum size in bytes allowed for the entire header section
const MAX_HEADER_BYTES: usize = 8 * 1024;

/// A fully decoded request: the parsed head and, when the method carries
/// one, the body bytes.
#[derive(Debug)]
pub struct DecodedRequest {
    pub head: RequestHead,
    pub body: Option<Bytes>,
}

/// Decoder for complete HTTP requests read from a blocking stream.
///
/// The decoder owns a reusable accumulation buffer; a single instance is
/// meant to live inside a connection and decode one request per call.
#[derive(Debug)]
pub struct RequestDecoder {
    buf: BytesMut,
}

impl Default for RequestDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestDecoder {
    pub fn new() -> Self {
        Self { buf: BytesMut::with_capacity(1024) }
    }

    /// Reads and parses one request from `reader`.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(request))` if a complete request was decoded
    /// - `Ok(None)` if the peer closed the stream before sending anything;
    ///   no response is owed in that case
    /// - `Err(ParseError)` if the stream ended mid-request or the bytes do
    ///   not form a valid request
    pub fn decode<R: BufRead>(&mut self, reader: &mut R) -> Result<Option<DecodedRequest>, ParseError> {
        let head_bytes = match self.read_head_section(reader)? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };

        let head = parse_head(head_bytes)?;
        let body = read_body(reader, &head)?;

        Ok(Some(DecodedRequest { head, body }))
    }

    /// Accumulates header lines until the blank line that terminates the
    /// head section, enforcing the size limit along the way.
    fn read_head_section<R: BufRead>(&mut self, reader: &mut R) -> Result<Option<Bytes>, ParseError> {
        self.buf.clear();
        let mut line = Vec::with_capacity(256);

        loop {
            line.clear();
            let n = reader.read_until(b'\n', &mut line)?;
            if n == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(ParseError::unexpected_eof("stream closed inside the header section"));
            }

            ensure!(
                self.buf.len() + n <= MAX_HEADER_BYTES,
                ParseError::too_large_header(self.buf.len() + n, MAX_HEADER_BYTES)
            );
            self.buf.extend_from_slice(&line);

            if line.as_slice() == b"\r\n" || line.as_slice() == b"\n" {
                return Ok(Some(self.buf.split().freeze()));
            }
        }
    }
}

/// Parses a complete head section into a typed [`RequestHead`].
fn parse_head(src: Bytes) -> Result<RequestHead, ParseError> {
    let mut req = httparse::Request::new(&mut []);
    let mut headers: [MaybeUninit<httparse::Header>; MAX_HEADER_NUM] =
        [const { MaybeUninit::uninit() }; MAX_HEADER_NUM];

    let parsed_result = req.parse_with_uninit_headers(&src, &mut headers).map_err(|e| match e {
        Error::TooManyHeaders => ParseError::too_many_headers(MAX_HEADER_NUM),
        e => ParseError::invalid_header(e.to_string()),
    })?;

    let head_size = match parsed_result {
        Status::Complete(head_size) => head_size,
        // the caller handed over a head section ending in a blank line, so a
        // partial parse means the request line or a header was malformed
        Status::Partial => return Err(ParseError::invalid_header("truncated request head")),
    };
    trace!(head_size, "parsed request head");

    let header_count = req.headers.len();
    ensure!(header_count <= MAX_HEADER_NUM, ParseError::too_many_headers(header_count));

    // Calculate and record byte range indices for each header
    let mut header_index: [HeaderIndex; MAX_HEADER_NUM] = EMPTY_HEADER_INDEX_ARRAY;
    HeaderIndex::record(&src, req.headers, &mut header_index);

    let version = match req.version {
        Some(0) => http::Version::HTTP_10,
        Some(1) => http::Version::HTTP_11,
        // HTTP/2 and HTTP/3 not supported
        version => return Err(ParseError::InvalidVersion(version)),
    };

    let mut builder = Request::builder()
        .method(req.method.ok_or(ParseError::InvalidMethod)?)
        .uri(req.path.ok_or(ParseError::InvalidUri)?)
        .version(version);

    if let Some(headers) = builder.headers_mut() {
        headers.reserve(header_count);
        for index in &header_index[..header_count] {
            // Safe to unwrap since httparse verified header name is valid ASCII
            let name = HeaderName::from_bytes(&src[index.name.0..index.name.1]).unwrap();

            // Safe to use from_maybe_shared_unchecked since httparse verified
            // header value contains only visible ASCII chars
            let value = unsafe { HeaderValue::from_maybe_shared_unchecked(src.slice(index.value.0..index.value.1)) };

            headers.append(name, value);
        }
    }

    let inner = builder.body(()).map_err(|e| ParseError::invalid_header(e.to_string()))?;
    Ok(RequestHead::from(inner))
}

/// Reads the request body for body-carrying methods.
///
/// A body-carrying method must present a numeric `Content-Length`; exactly
/// that many bytes are read. Other methods are never read for a body, even
/// when they advertise one.
fn read_body<R: BufRead>(reader: &mut R, head: &RequestHead) -> Result<Option<Bytes>, ParseError> {
    if !head.carries_body() {
        return Ok(None);
    }

    let value = head.headers().get(http::header::CONTENT_LENGTH).ok_or(ParseError::MissingContentLength)?;
    let text = value.to_str().map_err(|_| ParseError::invalid_content_length("value can't to_str"))?;
    let length = text
        .trim()
        .parse::<usize>()
        .map_err(|_| ParseError::invalid_content_length(format!("value {text} is not an unsigned integer")))?;

    if length == 0 {
        return Ok(Some(Bytes::new()));
    }

    let mut body = vec![0u8; length];
    reader.read_exact(&mut body).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => {
            ParseError::unexpected_eof(format!("stream closed before {length} body bytes arrived"))
        }
        _ => ParseError::io(e),
    })?;

    Ok(Some(Bytes::from(body)))
}

/// Stores the byte range positions of a header's name and value within the
/// original buffer.
///
/// Used internally to perform zero-copy conversion of headers by recording
/// positions rather than copying the data.
#[derive(Clone, Copy)]
struct HeaderIndex {
    name: (usize, usize),
    value: (usize, usize),
}

const EMPTY_HEADER_INDEX: HeaderIndex = HeaderIndex { name: (0, 0), value: (0, 0) };

const EMPTY_HEADER_INDEX_ARRAY: [HeaderIndex; MAX_HEADER_NUM] = [EMPTY_HEADER_INDEX; MAX_HEADER_NUM];

impl HeaderIndex {
    fn record(bytes: &[u8], headers: &[httparse::Header<'_>], indices: &mut [HeaderIndex]) {
        let bytes_ptr = bytes.as_ptr() as usize;
        for (header, indices) in headers.iter().zip(indices.iter_mut()) {
            let name_start = header.name.as_ptr() as usize - bytes_ptr;
            let name_end = name_start + header.name.len();
            indices.name = (name_start, name_end);
            let value_start = header.value.as_ptr() as usize - bytes_ptr;
            let value_end = value_start + header.value.len();
            indices.value = (value_start, value_end);
        }
    }
}
