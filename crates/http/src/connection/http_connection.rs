//! Core connection handling.
//!
//! [`HttpConnection`] owns the two halves of an accepted stream, wraps them
//! in buffered readers/writers, and drives the codec: one `read_request`
//! followed by one `send`, after which the connection is dropped and the
//! underlying stream closed by its owner.
//!
//! The connection is generic over `Read`/`Write` so the layers above can be
//! exercised against in-memory streams in tests.

use std::io::{BufReader, BufWriter, Read, Write};

use bytes::BytesMut;

use crate::codec::{DecodedRequest, RequestDecoder, ResponseEncoder};
use crate::protocol::{ParseError, ResponseHead, SendError};

/// Default capacity for the read and write buffers.
const DEFAULT_BUFFER_SIZE: usize = 8 * 1024;

/// A single accepted connection, exclusively owned by the worker that
/// processes it for the duration of one request/response cycle.
#[derive(Debug)]
pub struct HttpConnection<R, W: Write> {
    reader: BufReader<R>,
    writer: BufWriter<W>,
    decoder: RequestDecoder,
    encoder: ResponseEncoder,
    write_buf: BytesMut,
}

impl<R, W> HttpConnection<R, W>
where
    R: Read,
    W: Write,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self::with_buffer_sizes(reader, writer, DEFAULT_BUFFER_SIZE, DEFAULT_BUFFER_SIZE)
    }

    /// Creates a connection with explicit read/write buffer capacities.
    pub fn with_buffer_sizes(reader: R, writer: W, read_capacity: usize, write_capacity: usize) -> Self {
        Self {
            reader: BufReader::with_capacity(read_capacity, reader),
            writer: BufWriter::with_capacity(write_capacity, writer),
            decoder: RequestDecoder::new(),
            encoder: ResponseEncoder::new(),
            write_buf: BytesMut::new(),
        }
    }

    /// Reads one request off the connection.
    ///
    /// Returns `Ok(None)` when the peer closed the stream without sending a
    /// request; see [`RequestDecoder::decode`] for the error conditions.
    pub fn read_request(&mut self) -> Result<Option<DecodedRequest>, ParseError> {
        self.decoder.decode(&mut self.reader)
    }

    /// Serializes and writes a response, flushing the stream.
    ///
    /// The full response is staged in memory first, so the header block
    /// always reaches the wire ahead of the body bytes.
    pub fn send(&mut self, head: ResponseHead, body: &[u8]) -> Result<(), SendError> {
        self.write_buf.clear();
        self.encoder.encode(head, body, &mut self.write_buf)?;
        self.writer.write_all(&self.write_buf)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Consumes the connection, returning the writer half.
    ///
    /// [`send`](Self::send) flushes after every response, so no buffered
    /// bytes are lost here. Primarily useful in tests to inspect what was
    /// written.
    pub fn into_writer(self) -> W {
        self.writer.into_parts().0
    }
}
