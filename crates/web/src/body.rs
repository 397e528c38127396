//! Response content produced by handlers, the cache, or the error path.

use bytes::Bytes;
use http::{HeaderMap, HeaderValue, StatusCode, header};
use tracing::warn;

/// Response payload: textual or binary.
#[derive(Debug, Clone)]
pub enum Content {
    Text(String),
    Binary(Bytes),
}

/// A response produced by exactly one pipeline pass.
///
/// Cloneable so the cache can keep a copy while the worker post-processes
/// and encodes its own.
#[derive(Debug, Clone)]
pub struct ResponseBody {
    status: StatusCode,
    headers: HeaderMap,
    content: Content,
}

impl ResponseBody {
    /// Textual response, served as HTML by default.
    pub fn text(content: impl Into<String>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"));
        Self { status: StatusCode::OK, headers, content: Content::Text(content.into()) }
    }

    /// Binary response.
    pub fn binary(content: impl Into<Bytes>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"));
        Self { status: StatusCode::OK, headers, content: Content::Binary(content.into()) }
    }

    /// The error body shown when a pipeline stage fails.
    pub fn error_page(status: StatusCode, message: &str) -> Self {
        Self::text(format!(
            "<html><head><title>{status}</title></head><body><h1>{status}</h1><p>{message}</p></body></html>"
        ))
        .with_status(status)
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn with_header(mut self, name: header::HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn content(&self) -> &Content {
        &self.content
    }

    pub(crate) fn content_mut(&mut self) -> &mut Content {
        &mut self.content
    }

    pub fn is_text(&self) -> bool {
        matches!(self.content, Content::Text(_))
    }

    /// The payload as raw bytes, whatever the content kind.
    pub fn content_bytes(&self) -> Bytes {
        match &self.content {
            Content::Text(text) => Bytes::copy_from_slice(text.as_bytes()),
            Content::Binary(bytes) => bytes.clone(),
        }
    }

    /// Appends a `Set-Cookie` header.
    pub fn set_cookie(&mut self, name: &str, value: &str) {
        match HeaderValue::from_str(&format!("{name}={value}")) {
            Ok(header_value) => {
                self.headers.append(header::SET_COOKIE, header_value);
            }
            Err(_) => warn!(cookie = name, "cookie does not form a valid header value, dropped"),
        }
    }

    pub(crate) fn into_parts(self) -> (StatusCode, HeaderMap, Content) {
        (self.status, self.headers, self.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_page_carries_status_and_message() {
        let body = ResponseBody::error_page(StatusCode::BAD_REQUEST, "token is required");

        assert_eq!(body.status(), StatusCode::BAD_REQUEST);
        assert!(body.is_text());
        match body.content() {
            Content::Text(text) => {
                assert!(text.contains("400 Bad Request"));
                assert!(text.contains("token is required"));
            }
            Content::Binary(_) => panic!("error pages are textual"),
        }
    }

    #[test]
    fn set_cookie_appends_rather_than_replaces() {
        let mut body = ResponseBody::text("ok");
        body.set_cookie("a", "1");
        body.set_cookie("b", "2");

        let cookies: Vec<_> = body.headers().get_all(header::SET_COOKIE).iter().collect();
        assert_eq!(cookies, vec!["a=1", "b=2"]);
    }

    #[test]
    fn content_bytes_covers_both_kinds() {
        assert_eq!(ResponseBody::text("hi").content_bytes(), Bytes::from_static(b"hi"));
        assert_eq!(
            ResponseBody::binary(Bytes::from_static(&[1, 2, 3])).content_bytes(),
            Bytes::from_static(&[1, 2, 3])
        );
    }
}
