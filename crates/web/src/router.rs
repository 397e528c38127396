//! Route table mapping request paths to handlers.
//!
//! Built once before serving and read-only afterwards, so it can be read
//! without synchronization. Matching never fails: a miss falls through to
//! the configured fallback handler.

use std::fmt;

use thiserror::Error;
use tracing::debug;

use crate::handler::{NotFoundHandler, RequestHandler};
use crate::request::ServerRequest;

type InnerRouter = matchit::Router<Box<dyn RequestHandler>>;

pub struct Router {
    inner: InnerRouter,
    fallback: Box<dyn RequestHandler>,
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router").finish_non_exhaustive()
    }
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    /// Resolves the handler for a request.
    ///
    /// Never fails; unmatched paths resolve to the fallback handler.
    pub fn route(&self, request: &ServerRequest) -> &dyn RequestHandler {
        match self.inner.at(request.uri().path()) {
            Ok(matched) => matched.value.as_ref(),
            Err(_) => {
                debug!(path = request.uri().path(), "no route matched, using fallback");
                self.fallback.as_ref()
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum RouterBuildError {
    #[error("invalid route '{path}': {source}")]
    InvalidRoute { path: String, source: matchit::InsertError },
}

pub struct RouterBuilder {
    routes: Vec<(String, Box<dyn RequestHandler>)>,
    fallback: Box<dyn RequestHandler>,
}

impl fmt::Debug for RouterBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterBuilder").field("routes", &self.routes.len()).finish_non_exhaustive()
    }
}

impl RouterBuilder {
    fn new() -> Self {
        Self { routes: Vec::new(), fallback: Box::new(NotFoundHandler) }
    }

    pub fn route(mut self, path: impl Into<String>, handler: impl RequestHandler + 'static) -> Self {
        self.routes.push((path.into(), Box::new(handler)));
        self
    }

    /// Replaces the default not-found fallback.
    pub fn fallback(mut self, handler: impl RequestHandler + 'static) -> Self {
        self.fallback = Box::new(handler);
        self
    }

    pub fn build(self) -> Result<Router, RouterBuildError> {
        let mut inner = InnerRouter::new();
        for (path, handler) in self.routes {
            inner
                .insert(path.clone(), handler)
                .map_err(|source| RouterBuildError::InvalidRoute { path, source })?;
        }
        Ok(Router { inner, fallback: self.fallback })
    }
}

#[cfg(test)]
mod tests {
    use http::{HeaderMap, Method, StatusCode, Version};

    use super::*;
    use crate::body::ResponseBody;
    use crate::handler::handler_fn;

    fn request(uri: &str) -> ServerRequest {
        ServerRequest::new(Method::GET, uri.parse().unwrap(), Version::HTTP_11, HeaderMap::new(), None)
    }

    fn router() -> Router {
        Router::builder()
            .route("/", handler_fn("index", |_req| Ok(Some(ResponseBody::text("index")))))
            .route("/login", handler_fn("login", |_req| Ok(Some(ResponseBody::text("login")))))
            .build()
            .unwrap()
    }

    #[test]
    fn matches_registered_paths() {
        let router = router();
        assert_eq!(router.route(&request("/")).name(), "index");
        assert_eq!(router.route(&request("/login")).name(), "login");
    }

    #[test]
    fn miss_resolves_to_the_fallback() {
        let router = router();
        let handler = router.route(&request("/missing"));
        assert_eq!(handler.name(), "not_found");

        let body = handler.handle(&mut request("/missing")).unwrap().unwrap();
        assert_eq!(body.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn custom_fallback_replaces_not_found() {
        let router = Router::builder()
            .fallback(handler_fn("teapot", |_req| {
                Ok(Some(ResponseBody::text("teapot").with_status(StatusCode::IM_A_TEAPOT)))
            }))
            .build()
            .unwrap();

        assert_eq!(router.route(&request("/anything")).name(), "teapot");
    }

    #[test]
    fn conflicting_routes_fail_the_build() {
        let result = Router::builder()
            .route("/a", handler_fn("first", |_req| Ok(None)))
            .route("/a", handler_fn("second", |_req| Ok(None)))
            .build();

        assert!(matches!(result, Err(RouterBuildError::InvalidRoute { path, .. }) if path == "/a"));
    }
}
