//! The route-handler surface consumed by the worker pipeline.

use std::fmt;

use http::StatusCode;

use crate::body::ResponseBody;
use crate::error::HandlerError;
use crate::request::ServerRequest;
use crate::validation::{ValidationStage, Validator};

/// A route handler: maps a parsed request to response content.
///
/// `handle` returning `Ok(None)` is the internal-redirect signal: the
/// worker looks for a staged replacement request in the request metadata
/// and restarts routing against it.
pub trait RequestHandler: Send + Sync {
    /// Stable identity of this handler; also the response cache key.
    fn name(&self) -> &str;

    /// Produces the response, or `None` to signal an internal redirect.
    fn handle(&self, request: &mut ServerRequest) -> Result<Option<ResponseBody>, HandlerError>;

    /// Whether this handler's output may be cached at all.
    fn cache_applicable(&self) -> bool {
        false
    }

    /// Whether this specific request may be served from cache.
    ///
    /// Only consulted when [`cache_applicable`](Self::cache_applicable) is
    /// true.
    fn is_applicable(&self, _request: &ServerRequest) -> bool {
        true
    }

    /// Validators to run before this handler executes, in declared order.
    fn validators(&self, _stage: ValidationStage) -> &[Box<dyn Validator>] {
        &[]
    }
}

/// A [`RequestHandler`] built from a closure.
pub struct FnHandler<F> {
    name: String,
    f: F,
}

impl<F> fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Wraps a closure as a named [`RequestHandler`].
pub fn handler_fn<F>(name: impl Into<String>, f: F) -> FnHandler<F>
where
    F: Fn(&mut ServerRequest) -> Result<Option<ResponseBody>, HandlerError> + Send + Sync,
{
    FnHandler { name: name.into(), f }
}

impl<F> RequestHandler for FnHandler<F>
where
    F: Fn(&mut ServerRequest) -> Result<Option<ResponseBody>, HandlerError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&self, request: &mut ServerRequest) -> Result<Option<ResponseBody>, HandlerError> {
        (self.f)(request)
    }
}

/// Fallback handler used when no route matches.
#[derive(Debug, Default)]
pub struct NotFoundHandler;

impl RequestHandler for NotFoundHandler {
    fn name(&self) -> &str {
        "not_found"
    }

    fn handle(&self, request: &mut ServerRequest) -> Result<Option<ResponseBody>, HandlerError> {
        Ok(Some(ResponseBody::error_page(
            StatusCode::NOT_FOUND,
            &format!("no route for {}", request.uri().path()),
        )))
    }
}

#[cfg(test)]
mod tests {
    use http::{HeaderMap, Method, Version};

    use super::*;
    use crate::body::Content;

    fn request(uri: &str) -> ServerRequest {
        ServerRequest::new(Method::GET, uri.parse().unwrap(), Version::HTTP_11, HeaderMap::new(), None)
    }

    #[test]
    fn handler_fn_invokes_the_closure() {
        let handler = handler_fn("greet", |_req| Ok(Some(ResponseBody::text("hi"))));
        assert_eq!(handler.name(), "greet");
        assert!(!handler.cache_applicable());

        let body = handler.handle(&mut request("/")).unwrap().unwrap();
        assert!(matches!(body.content(), Content::Text(text) if text == "hi"));
    }

    #[test]
    fn not_found_handler_reports_the_path() {
        let body = NotFoundHandler.handle(&mut request("/missing")).unwrap().unwrap();

        assert_eq!(body.status(), StatusCode::NOT_FOUND);
        assert!(matches!(body.content(), Content::Text(text) if text.contains("/missing")));
    }
}
