//! Content checksums for response bodies.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use md5::{Digest, Md5};

/// A resettable MD5 digest bound to one worker.
///
/// Fed the pre-compression body bytes; the base64-encoded digest goes into
/// the `Content-MD5` header. `finalize_reset` leaves the engine clean for
/// the next request.
#[derive(Debug, Default)]
pub struct ContentChecksum {
    digest: Md5,
}

impl ContentChecksum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn checksum(&mut self, data: &[u8]) -> String {
        self.digest.update(data);
        STANDARD.encode(self.digest.finalize_reset())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_an_independently_computed_digest() {
        let mut checksum = ContentChecksum::new();
        let expected = STANDARD.encode(Md5::digest(b"hello world"));

        assert_eq!(checksum.checksum(b"hello world"), expected);
    }

    #[test]
    fn engine_is_clean_after_each_checksum() {
        let mut checksum = ContentChecksum::new();

        let first = checksum.checksum(b"one");
        let _ = checksum.checksum(b"two");
        let first_again = checksum.checksum(b"one");

        assert_eq!(first, first_again);
    }
}
