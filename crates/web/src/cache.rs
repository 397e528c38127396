//! Response cache keyed by handler identity.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::body::ResponseBody;

/// Store for memoized handler output.
///
/// Reads are concurrent; writes are serialized by the store. Two threads
/// racing to fill the same key is acceptable: a cache-applicable handler
/// must produce identical content for identical requests, so either write
/// may win.
pub trait CacheStore: Send + Sync {
    fn has_cache(&self, handler: &str) -> bool;

    fn get_cache(&self, handler: &str) -> Option<ResponseBody>;

    fn set_cache(&self, handler: &str, body: ResponseBody);
}

/// In-memory [`CacheStore`] with no expiry.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, ResponseBody>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryCacheStore {
    fn has_cache(&self, handler: &str) -> bool {
        self.entries.read().unwrap().contains_key(handler)
    }

    fn get_cache(&self, handler: &str) -> Option<ResponseBody> {
        self.entries.read().unwrap().get(handler).cloned()
    }

    fn set_cache(&self, handler: &str, body: ResponseBody) {
        self.entries.write().unwrap().insert(handler.to_owned(), body);
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[test]
    fn stored_bodies_come_back_intact() {
        let store = MemoryCacheStore::new();
        assert!(!store.has_cache("page"));
        assert!(store.get_cache("page").is_none());

        store.set_cache("page", ResponseBody::text("cached"));

        assert!(store.has_cache("page"));
        let body = store.get_cache("page").unwrap();
        assert_eq!(body.content_bytes(), Bytes::from_static(b"cached"));
    }

    #[test]
    fn later_writes_win() {
        let store = MemoryCacheStore::new();
        store.set_cache("page", ResponseBody::text("first"));
        store.set_cache("page", ResponseBody::text("second"));

        assert_eq!(store.get_cache("page").unwrap().content_bytes(), Bytes::from_static(b"second"));
    }
}
