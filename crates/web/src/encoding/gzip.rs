//! Reusable gzip compression.

use std::io::Write;

use bytes::Bytes;
use flate2::Compression;
use flate2::write::GzEncoder;

use crate::error::EncodingError;

/// A gzip compressor bound to one worker.
///
/// The output buffer is reused across requests: `compress` resets it,
/// streams the input through an encoder, finishes the stream and reads the
/// result back out.
#[derive(Debug, Default)]
pub struct GzipCompressor {
    buf: Vec<u8>,
}

impl GzipCompressor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears any state left over from the previous compression.
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    /// Compresses `data`, returning the complete gzip stream.
    ///
    /// Producing no output for non-empty input is a compression failure;
    /// callers fall back to sending the original bytes uncompressed.
    pub fn compress(&mut self, data: &[u8]) -> Result<Bytes, EncodingError> {
        self.reset();

        let mut encoder = GzEncoder::new(&mut self.buf, Compression::best());
        encoder.write_all(data)?;
        encoder.finish()?;

        if !data.is_empty() && self.buf.is_empty() {
            return Err(EncodingError::EmptyOutput { input_len: data.len() });
        }

        Ok(Bytes::copy_from_slice(&self.buf))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use flate2::read::GzDecoder;

    use super::*;

    fn decompress(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        GzDecoder::new(data).read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn round_trip() {
        let mut compressor = GzipCompressor::new();
        let input = b"hello hello hello hello hello hello";

        let compressed = compressor.compress(input).unwrap();
        assert_eq!(decompress(&compressed), input);
    }

    #[test]
    fn no_state_leaks_between_consecutive_compressions() {
        let mut compressor = GzipCompressor::new();

        let first = compressor.compress(b"first request body").unwrap();
        assert_eq!(decompress(&first), b"first request body");

        let second = compressor.compress(b"second, unrelated body").unwrap();
        assert_eq!(decompress(&second), b"second, unrelated body");

        // same input compresses to the same stream after reuse
        let first_again = compressor.compress(b"first request body").unwrap();
        assert_eq!(first, first_again);
    }

    #[test]
    fn repetitive_input_shrinks() {
        let mut compressor = GzipCompressor::new();
        let input = "ember ".repeat(500);

        let compressed = compressor.compress(input.as_bytes()).unwrap();
        assert!(compressed.len() < input.len());
    }
}
