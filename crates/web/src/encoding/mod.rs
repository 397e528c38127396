//! Reusable per-worker response encoding.
//!
//! Each worker owns one [`GzipCompressor`] and one [`ContentChecksum`] for
//! its whole lifetime, so encoding a response allocates nothing beyond the
//! compressed output itself. Neither type is shared across workers.

mod checksum;
mod gzip;

pub use checksum::ContentChecksum;
pub use gzip::GzipCompressor;
