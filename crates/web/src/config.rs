//! Server configuration.

use std::time::Duration;

/// Runtime configuration for the execution core.
///
/// All values are fixed at startup; nothing here is reloadable while the
/// server is accepting connections.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Number of reusable workers in the pool.
    pub workers: usize,
    /// Number of operating threads in the dispatcher's thread pool.
    pub executor_threads: usize,
    /// Read buffer capacity per connection.
    pub read_buffer_size: usize,
    /// Write buffer capacity per connection.
    pub write_buffer_size: usize,
    /// Compress response bodies with gzip for clients that accept it.
    pub gzip: bool,
    /// Attach a `Content-MD5` checksum header to responses.
    pub content_md5: bool,
    /// Serve cache-applicable handlers from the response cache.
    pub cache_enabled: bool,
    /// Maximum number of internal redirects followed for one connection.
    pub max_redirect_hops: usize,
    /// How long shutdown waits for in-flight requests before abandoning
    /// them.
    pub shutdown_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            executor_threads: 8,
            read_buffer_size: 8 * 1024,
            write_buffer_size: 8 * 1024,
            gzip: true,
            content_md5: true,
            cache_enabled: true,
            max_redirect_hops: 10,
            shutdown_grace: Duration::from_secs(5),
        }
    }
}
