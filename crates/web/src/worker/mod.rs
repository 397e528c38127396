//! The per-connection request pipeline.
//!
//! A [`Worker`] is a long-lived, reusable object drawn from the
//! [`WorkerPool`]: it parses the request off the connection, drives it
//! through routing, validation, caching, execution and post-processing,
//! encodes and writes the response, then resets itself for the next
//! connection. Exactly one thread touches a worker between acquire and
//! release, so none of this needs internal locking.
//!
//! Failures below the pipeline boundary never escape: parse failures abort
//! the connection without a response, everything else is converted into an
//! error response exactly once and the pipeline continues at the encode
//! stage.

mod pool;

pub use pool::{PoolError, WorkerPool};

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use ember_http::connection::HttpConnection;
use http::{HeaderMap, HeaderName, HeaderValue, Method, Response, header};
use tracing::{debug, error, trace, warn};

use crate::body::{Content, ResponseBody};
use crate::encoding::{ContentChecksum, GzipCompressor};
use crate::error::WebError;
use crate::handler::RequestHandler;
use crate::request::{MetaValue, ServerRequest, meta};
use crate::server::ServerContext;
use crate::session::SESSION_COOKIE;
use crate::validation::{ValidationOutcome, ValidationStage};

/// Checksum header attached when `content_md5` is enabled.
const CONTENT_MD5: HeaderName = HeaderName::from_static("content-md5");

const GZIP: HeaderValue = HeaderValue::from_static("gzip");

/// Result of driving one request through the routing loop.
enum PipelineOutcome {
    /// A response to encode and write, tagged with the handler that
    /// produced it.
    Response { handler: String, body: ResponseBody },
    /// No response is owed; tear the connection down silently.
    Abort,
}

/// The reusable pipeline object.
///
/// Holds the worker-scoped encoding engines and a handle to the shared
/// server context; everything request-scoped lives on the stack of
/// [`serve_connection`](Self::serve_connection), so nothing can leak from
/// one connection into the next.
pub struct Worker {
    context: Arc<ServerContext>,
    compressor: GzipCompressor,
    checksum: ContentChecksum,
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker").finish_non_exhaustive()
    }
}

impl Worker {
    pub fn new(context: Arc<ServerContext>) -> Self {
        Self { context, compressor: GzipCompressor::new(), checksum: ContentChecksum::new() }
    }

    /// Serves one accepted TCP connection end to end.
    pub fn serve(&mut self, stream: TcpStream) {
        let reader = match stream.try_clone() {
            Ok(reader) => reader,
            Err(e) => {
                error!(cause = %e, "failed to clone the stream for reading");
                return;
            }
        };

        let config = self.context.config();
        let mut connection =
            HttpConnection::with_buffer_sizes(reader, stream, config.read_buffer_size, config.write_buffer_size);
        self.serve_connection(&mut connection);
    }

    /// The pipeline proper, generic over the stream halves so it can run
    /// against in-memory connections.
    pub fn serve_connection<R: Read, W: Write>(&mut self, connection: &mut HttpConnection<R, W>) {
        let started = Instant::now();

        let decoded = match connection.read_request() {
            Ok(Some(decoded)) => decoded,
            Ok(None) => return,
            Err(e) => {
                // malformed request: no response is owed
                warn!(cause = %e, "failed to parse request, aborting connection");
                return;
            }
        };

        let mut request = ServerRequest::from(decoded);
        trace!(method = %request.method(), path = request.uri().path(), "request received");

        self.attach_session(&mut request);

        let (handler_name, body) = match self.drive(&mut request) {
            Ok(PipelineOutcome::Response { handler, body }) => (handler, body),
            Ok(PipelineOutcome::Abort) => return,
            Err(e) => {
                error!(cause = %e, "error while handling request");
                let handler = match &e {
                    WebError::Handler { handler, .. } => handler.clone(),
                    _ => String::from("error"),
                };
                (handler, e.to_response())
            }
        };

        self.finish(&request, &handler_name, body, connection, started);

        request.set_valid(false);
        self.reset();
    }

    fn attach_session(&self, request: &mut ServerRequest) {
        match self.context.sessions().session_for(request) {
            Some(session) => {
                // a fresh session has no cookie on the request yet
                if request.cookie(SESSION_COOKIE).is_none() {
                    request.stage_cookie(SESSION_COOKIE, session.id());
                }
                self.context.sessions().touch(session.id());
                request.set_session(session);
            }
            None => warn!("could not initialize session"),
        }
    }

    /// Routes, validates, consults the cache and executes, following
    /// internal redirects up to the configured hop limit.
    fn drive(&self, request: &mut ServerRequest) -> Result<PipelineOutcome, WebError> {
        let config = self.context.config();
        let mut hops = 0;

        loop {
            let handler = self.context.router().route(request);
            validate(handler, request)?;

            let mut serve_from_cache = false;
            let mut fill_cache = false;
            if config.cache_enabled && handler.cache_applicable() && handler.is_applicable(request) {
                if self.context.cache().has_cache(handler.name()) {
                    serve_from_cache = true;
                } else {
                    fill_cache = true;
                }
            }

            let body = if serve_from_cache {
                match self.context.cache().get_cache(handler.name()) {
                    Some(body) => {
                        trace!(handler = handler.name(), "serving from cache");
                        Some(body)
                    }
                    // the entry can be dropped between the check and the read
                    None => invoke(handler, request)?,
                }
            } else {
                invoke(handler, request)?
            };

            let Some(body) = body else {
                match request.take_redirect() {
                    Some(target) => {
                        hops += 1;
                        if hops > config.max_redirect_hops {
                            return Err(WebError::TooManyRedirects { limit: config.max_redirect_hops });
                        }
                        debug!(path = target.uri().path(), hops, "following internal redirect");
                        *request = target;
                        continue;
                    }
                    None => {
                        debug!(handler = handler.name(), "no response and no redirect target, aborting");
                        return Ok(PipelineOutcome::Abort);
                    }
                }
            };

            if fill_cache {
                self.context.cache().set_cache(handler.name(), body.clone());
            }

            let body = self.postprocess(handler, request, body);
            return Ok(PipelineOutcome::Response { handler: handler.name().to_owned(), body });
        }
    }

    /// Cookie merge, content-type propagation and the transformer chains.
    fn postprocess(
        &self,
        handler: &dyn RequestHandler,
        request: &mut ServerRequest,
        mut body: ResponseBody,
    ) -> ResponseBody {
        for (name, value) in request.staged_cookies() {
            body.set_cookie(name, value);
        }

        let content_type =
            body.headers().get(header::CONTENT_TYPE).and_then(|value| value.to_str().ok()).map(str::to_owned);
        match content_type {
            Some(value) => request.set_meta(meta::CONTENT_TYPE, MetaValue::Text(value)),
            None => request.set_meta(meta::CONTENT_TYPE, MetaValue::Absent),
        }

        // HEAD responses carry no body to transform
        if request.method() != Method::HEAD {
            let procedures = self.context.procedures();

            if let Content::Text(text) = body.content_mut() {
                if !procedures.text_procedures().is_empty() {
                    let mut current = std::mem::take(text);
                    for procedure in procedures.text_procedures() {
                        current = procedure.apply(handler, request, current);
                    }
                    *text = current;
                }
            }

            if !procedures.byte_procedures().is_empty() {
                let mut current = body.content_bytes();
                for procedure in procedures.byte_procedures() {
                    current = procedure.apply(handler, request, current);
                }
                *body.content_mut() = Content::Binary(current);
            }
        }

        body
    }

    /// Encodes (checksum, then optional gzip) and writes the response.
    fn finish<R: Read, W: Write>(
        &mut self,
        request: &ServerRequest,
        handler_name: &str,
        body: ResponseBody,
        connection: &mut HttpConnection<R, W>,
        started: Instant,
    ) {
        let config = self.context.config();
        let is_text = body.is_text();
        let (status, mut headers, content) = body.into_parts();

        let mut payload = match content {
            Content::Text(text) => Bytes::from(text),
            Content::Binary(bytes) => bytes,
        };

        // the checksum covers the bytes as produced, not as transferred
        if config.content_md5 {
            let digest = self.checksum.checksum(&payload);
            // base64 output is always a valid header value
            headers.insert(CONTENT_MD5, HeaderValue::from_str(&digest).unwrap());
        }

        if config.gzip {
            if accepts_gzip(request.headers()) {
                match self.compressor.compress(&payload) {
                    Ok(compressed) => {
                        trace!(from = payload.len(), to = compressed.len(), "gzip applied");
                        payload = compressed;
                        headers.insert(header::CONTENT_ENCODING, GZIP);
                    }
                    // recoverable: send the original bytes identity-encoded
                    Err(e) => warn!(cause = %e, "compression failed, sending identity bytes"),
                }
            } else {
                debug!("client does not accept gzip");
            }
        }

        let mut head = Response::new(());
        *head.status_mut() = status;
        *head.headers_mut() = headers;

        if let Err(e) = connection.send(head, &payload) {
            error!(cause = %e, "failed to write response");
        }

        debug!(
            handler = handler_name,
            content = if is_text { "text" } else { "bytes" },
            length = payload.len(),
            elapsed = ?started.elapsed(),
            "request served"
        );
    }

    /// Clears per-connection transient state before the worker returns to
    /// the pool.
    pub(crate) fn reset(&mut self) {
        self.compressor.reset();
    }
}

fn invoke(handler: &dyn RequestHandler, request: &mut ServerRequest) -> Result<Option<ResponseBody>, WebError> {
    handler.handle(request).map_err(|e| WebError::handler(handler.name(), e))
}

fn validate(handler: &dyn RequestHandler, request: &ServerRequest) -> Result<(), WebError> {
    let (stage, params) = if request.method() == Method::POST {
        (ValidationStage::BodyParameters, request.post_params())
    } else {
        (ValidationStage::QueryParameters, request.query_params())
    };

    for validator in handler.validators(stage) {
        if let ValidationOutcome::Failure { reason } = validator.validate(params) {
            return Err(WebError::Validation { reason });
        }
    }
    Ok(())
}

fn accepts_gzip(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT_ENCODING)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.contains("gzip"))
}
