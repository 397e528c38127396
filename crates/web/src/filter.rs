//! Connection filters, consulted before a socket involves a worker.
//!
//! An explicit registry populated at startup: every accepted connection
//! runs through the chain in registration order, and the first filter to
//! reject it makes the dispatcher close the socket immediately.

use std::fmt;
use std::net::TcpStream;

/// A predicate over an accepted connection.
pub trait ConnectionFilter: Send + Sync {
    fn allow(&self, stream: &TcpStream) -> bool;
}

struct FnFilter<F>(F);

impl<F: Fn(&TcpStream) -> bool + Send + Sync> ConnectionFilter for FnFilter<F> {
    fn allow(&self, stream: &TcpStream) -> bool {
        (self.0)(stream)
    }
}

/// Wraps a closure as a [`ConnectionFilter`].
pub fn fn_filter<F>(f: F) -> impl ConnectionFilter
where
    F: Fn(&TcpStream) -> bool + Send + Sync,
{
    FnFilter(f)
}

/// Built-in filter rejecting sockets whose peer is already gone.
pub fn connected() -> ConnectedFilter {
    ConnectedFilter
}

#[derive(Debug)]
pub struct ConnectedFilter;

impl ConnectionFilter for ConnectedFilter {
    fn allow(&self, stream: &TcpStream) -> bool {
        stream.peer_addr().is_ok()
    }
}

/// All-of composition of [`ConnectionFilter`]s.
#[derive(Default)]
pub struct FilterChain {
    filters: Vec<Box<dyn ConnectionFilter>>,
}

impl fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterChain").field("filters", &self.filters.len()).finish()
    }
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<F: ConnectionFilter + 'static>(mut self, filter: F) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    /// Whether every registered filter accepts the connection.
    pub fn accept(&self, stream: &TcpStream) -> bool {
        self.filters.iter().all(|filter| filter.allow(stream))
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;

    use super::*;

    fn stream_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (accepted, _addr) = listener.accept().unwrap();
        (client, accepted)
    }

    #[test]
    fn empty_chain_accepts_everything() {
        let (_client, accepted) = stream_pair();
        assert!(FilterChain::new().accept(&accepted));
    }

    #[test]
    fn any_rejecting_filter_rejects_the_connection() {
        let (_client, accepted) = stream_pair();
        let chain = FilterChain::new().with(fn_filter(|_stream| true)).with(fn_filter(|_stream| false));
        assert!(!chain.accept(&accepted));
    }

    #[test]
    fn connected_filter_accepts_a_live_peer() {
        let (_client, accepted) = stream_pair();
        assert!(connected().allow(&accepted));
    }
}
