//! The per-connection request value the pipeline operates on.
//!
//! A [`ServerRequest`] is constructed once per connection from the decoded
//! wire request and mutated as the pipeline advances: the worker attaches a
//! session, handlers stage cookies and metadata on it, validators read its
//! parameter maps, and an internal redirect replaces it wholesale. It is
//! never shared across connections.

use std::collections::HashMap;

use bytes::Bytes;
use ember_http::codec::DecodedRequest;
use http::{HeaderMap, Method, Uri, Version, header};

use crate::session::Session;

/// Well-known metadata keys used by the pipeline itself.
pub mod meta {
    /// Holds the replacement request staged by
    /// [`ServerRequest::internal_redirect`](super::ServerRequest::internal_redirect).
    pub const INTERNAL_REDIRECT: &str = "internal_redirect";

    /// Resolved content type of the response, for transformers to branch
    /// on.
    pub const CONTENT_TYPE: &str = "content_type";
}

/// A value stored in the request metadata map.
#[derive(Debug, Clone)]
pub enum MetaValue {
    Text(String),
    /// Marks a key as explicitly unset, as opposed to never written.
    Absent,
    /// A staged internal-redirect replacement request.
    Target(Box<ServerRequest>),
}

/// Multi-valued parameter map decoded from a query string or a
/// form-urlencoded body.
///
/// Decoding is best-effort: input that does not form valid parameters
/// yields an empty map rather than an error.
#[derive(Debug, Clone, Default)]
pub struct ParamMap {
    entries: Vec<(String, String)>,
}

impl ParamMap {
    fn parse_str(input: &str) -> Self {
        serde_urlencoded::from_str(input).map(|entries| Self { entries }).unwrap_or_default()
    }

    fn parse_bytes(input: &[u8]) -> Self {
        serde_urlencoded::from_bytes(input).map(|entries| Self { entries }).unwrap_or_default()
    }

    /// First value recorded for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.iter().find(|(name, _)| name == key).map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(name, _)| name == key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in the order they appeared on the wire.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

/// A parsed request, owned by the worker processing it for the duration of
/// one request/response cycle.
#[derive(Debug, Clone)]
pub struct ServerRequest {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    query_params: ParamMap,
    body: Option<Bytes>,
    post_params: ParamMap,
    meta: HashMap<String, MetaValue>,
    staged_cookies: Vec<(String, String)>,
    valid: bool,
    session: Option<Session>,
}

impl ServerRequest {
    /// Builds a request, eagerly decoding the query string and, for
    /// form-urlencoded bodies, the body parameters.
    pub fn new(method: Method, uri: Uri, version: Version, headers: HeaderMap, body: Option<Bytes>) -> Self {
        let query_params = uri.query().map(ParamMap::parse_str).unwrap_or_default();
        let post_params = match &body {
            Some(bytes) if is_form(&headers) => ParamMap::parse_bytes(bytes),
            _ => ParamMap::default(),
        };

        Self {
            method,
            uri,
            version,
            headers,
            query_params,
            body,
            post_params,
            meta: HashMap::new(),
            staged_cookies: Vec::new(),
            valid: true,
            session: None,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn query_params(&self) -> &ParamMap {
        &self.query_params
    }

    /// Parameters decoded from a form-urlencoded request body; empty for
    /// any other body kind.
    pub fn post_params(&self) -> &ParamMap {
        &self.post_params
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Value of the named cookie from the `Cookie` header.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        let cookies = self.headers.get(header::COOKIE)?.to_str().ok()?;
        cookies
            .split(';')
            .map(str::trim)
            .find_map(|pair| pair.split_once('=').filter(|(key, _)| *key == name).map(|(_, value)| value))
    }

    pub fn meta(&self, key: &str) -> Option<&MetaValue> {
        self.meta.get(key)
    }

    pub fn set_meta(&mut self, key: impl Into<String>, value: MetaValue) {
        self.meta.insert(key.into(), value);
    }

    pub fn remove_meta(&mut self, key: &str) -> Option<MetaValue> {
        self.meta.remove(key)
    }

    /// Stages a cookie to be merged into the response headers during
    /// post-processing.
    pub fn stage_cookie(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.staged_cookies.push((name.into(), value.into()));
    }

    pub fn staged_cookies(&self) -> &[(String, String)] {
        &self.staged_cookies
    }

    /// False once the request has been fully handled.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn set_valid(&mut self, valid: bool) {
        self.valid = valid;
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn set_session(&mut self, session: Session) {
        self.session = Some(session);
    }

    /// Stages an internal redirect to `path`.
    ///
    /// The replacement is a GET request against `path` inheriting this
    /// request's headers and session. The pipeline picks it up when the
    /// current handler returns no response.
    pub fn internal_redirect(&mut self, path: &str) {
        let uri: Uri = path.parse().unwrap_or_else(|_| Uri::from_static("/"));
        let mut target = ServerRequest::new(Method::GET, uri, self.version, self.headers.clone(), None);
        target.session = self.session.clone();
        self.set_meta(meta::INTERNAL_REDIRECT, MetaValue::Target(Box::new(target)));
    }

    /// Removes and returns the staged redirect target, if any.
    pub fn take_redirect(&mut self) -> Option<ServerRequest> {
        match self.meta.remove(meta::INTERNAL_REDIRECT) {
            Some(MetaValue::Target(target)) => Some(*target),
            _ => None,
        }
    }
}

fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with(mime::APPLICATION_WWW_FORM_URLENCODED.as_ref()))
}

impl From<DecodedRequest> for ServerRequest {
    fn from(decoded: DecodedRequest) -> Self {
        let (parts, _) = decoded.head.into_inner().into_parts();
        Self::new(parts.method, parts.uri, parts.version, parts.headers, decoded.body)
    }
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;

    use super::*;

    fn get(uri: &str) -> ServerRequest {
        ServerRequest::new(Method::GET, uri.parse().unwrap(), Version::HTTP_11, HeaderMap::new(), None)
    }

    #[test]
    fn query_parameters_are_decoded() {
        let request = get("/search?q=rust&page=2&q=web");

        assert_eq!(request.query_params().get("q"), Some("rust"));
        assert_eq!(request.query_params().get("page"), Some("2"));
        assert_eq!(request.query_params().len(), 3);
        assert!(!request.query_params().contains("missing"));
    }

    #[test]
    fn form_body_is_decoded_into_post_params() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/x-www-form-urlencoded"));

        let request = ServerRequest::new(
            Method::POST,
            "/submit".parse().unwrap(),
            Version::HTTP_11,
            headers,
            Some(Bytes::from_static(b"name=ember&kind=server")),
        );

        assert_eq!(request.post_params().get("name"), Some("ember"));
        assert_eq!(request.post_params().get("kind"), Some("server"));
    }

    #[test]
    fn non_form_body_yields_no_post_params() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let request = ServerRequest::new(
            Method::POST,
            "/submit".parse().unwrap(),
            Version::HTTP_11,
            headers,
            Some(Bytes::from_static(b"{\"name\":\"ember\"}")),
        );

        assert!(request.post_params().is_empty());
        assert_eq!(request.body().map(|b| b.len()), Some(16));
    }

    #[test]
    fn cookies_are_read_from_the_cookie_header() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; ember_session=abc123"));

        let request =
            ServerRequest::new(Method::GET, "/".parse().unwrap(), Version::HTTP_11, headers, None);

        assert_eq!(request.cookie("theme"), Some("dark"));
        assert_eq!(request.cookie("ember_session"), Some("abc123"));
        assert_eq!(request.cookie("missing"), None);
    }

    #[test]
    fn internal_redirect_stages_a_get_replacement() {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("gzip"));

        let mut request =
            ServerRequest::new(Method::POST, "/entry".parse().unwrap(), Version::HTTP_11, headers, None);
        request.set_session(Session::new("s1"));
        request.internal_redirect("/login");

        let target = request.take_redirect().expect("redirect should be staged");
        assert_eq!(target.method(), &Method::GET);
        assert_eq!(target.uri().path(), "/login");
        assert!(target.headers().contains_key(header::ACCEPT_ENCODING));
        assert_eq!(target.session().map(Session::id), Some("s1"));

        // the marker is consumed on take
        assert!(request.take_redirect().is_none());
    }

    #[test]
    fn meta_round_trip() {
        let mut request = get("/");
        request.set_meta("flag", MetaValue::Text("on".into()));

        assert!(matches!(request.meta("flag"), Some(MetaValue::Text(text)) if text == "on"));
        assert!(matches!(request.remove_meta("flag"), Some(MetaValue::Text(_))));
        assert!(request.meta("flag").is_none());
    }

    #[test]
    fn requests_start_valid() {
        let mut request = get("/");
        assert!(request.is_valid());
        request.set_valid(false);
        assert!(!request.is_valid());
    }
}
