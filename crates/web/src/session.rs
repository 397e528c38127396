//! Session lookup, an external collaborator consumed at its boundary.
//!
//! The worker resolves a session right after parsing, before routing, and
//! touches it so expiry-based providers see the activity. A request the
//! provider cannot establish a session for is still served; the absence is
//! only logged.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::request::ServerRequest;

/// Name of the cookie carrying the session id.
pub const SESSION_COOKIE: &str = "ember_session";

/// An established session attached to a request before routing.
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Resolves and refreshes sessions for incoming requests.
pub trait SessionProvider: Send + Sync {
    /// The session for this request, if one can be established.
    fn session_for(&self, request: &ServerRequest) -> Option<Session>;

    /// Marks a session as active right now.
    fn touch(&self, session_id: &str);
}

/// In-memory provider issuing monotonically numbered sessions, keyed by
/// the [`SESSION_COOKIE`] cookie.
#[derive(Debug, Default)]
pub struct MemorySessionProvider {
    next_id: AtomicU64,
    last_active: Mutex<HashMap<String, Instant>>,
}

impl MemorySessionProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionProvider for MemorySessionProvider {
    fn session_for(&self, request: &ServerRequest) -> Option<Session> {
        let mut last_active = self.last_active.lock().unwrap();

        if let Some(id) = request.cookie(SESSION_COOKIE) {
            if let Some(entry) = last_active.get_mut(id) {
                *entry = Instant::now();
                return Some(Session::new(id));
            }
        }

        let id = format!("{:016x}", self.next_id.fetch_add(1, Ordering::Relaxed));
        last_active.insert(id.clone(), Instant::now());
        Some(Session::new(id))
    }

    fn touch(&self, session_id: &str) {
        if let Some(entry) = self.last_active.lock().unwrap().get_mut(session_id) {
            *entry = Instant::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use http::{HeaderMap, HeaderValue, Method, Version, header};

    use super::*;

    fn request_with_cookie(cookie: Option<&str>) -> ServerRequest {
        let mut headers = HeaderMap::new();
        if let Some(cookie) = cookie {
            headers.insert(header::COOKIE, HeaderValue::from_str(cookie).unwrap());
        }
        ServerRequest::new(Method::GET, "/".parse().unwrap(), Version::HTTP_11, headers, None)
    }

    #[test]
    fn fresh_requests_get_distinct_sessions() {
        let provider = MemorySessionProvider::new();

        let first = provider.session_for(&request_with_cookie(None)).unwrap();
        let second = provider.session_for(&request_with_cookie(None)).unwrap();

        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn known_cookie_resolves_to_the_same_session() {
        let provider = MemorySessionProvider::new();
        let issued = provider.session_for(&request_with_cookie(None)).unwrap();

        let cookie = format!("{SESSION_COOKIE}={}", issued.id());
        let resolved = provider.session_for(&request_with_cookie(Some(&cookie))).unwrap();

        assert_eq!(resolved.id(), issued.id());
    }

    #[test]
    fn unknown_cookie_is_replaced_with_a_fresh_session() {
        let provider = MemorySessionProvider::new();
        let cookie = format!("{SESSION_COOKIE}=stale");

        let session = provider.session_for(&request_with_cookie(Some(&cookie))).unwrap();
        assert_ne!(session.id(), "stale");
    }
}
