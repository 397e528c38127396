//! Post-processing transformer chains applied to response content.
//!
//! Both lists are populated at configuration time and frozen before the
//! server starts accepting connections. Transformers run strictly in
//! registration order, each seeing the cumulative result of the ones
//! before it; text procedures run first, then the result is re-encoded and
//! any byte procedures run over it.

use std::fmt;

use bytes::Bytes;

use crate::handler::RequestHandler;
use crate::request::ServerRequest;

/// Transforms textual response content.
pub trait TextProcedure: Send + Sync {
    fn apply(&self, handler: &dyn RequestHandler, request: &ServerRequest, content: String) -> String;
}

/// Transforms response bytes, after any text procedures have run.
pub trait ByteProcedure: Send + Sync {
    fn apply(&self, handler: &dyn RequestHandler, request: &ServerRequest, content: Bytes) -> Bytes;
}

struct FnTextProcedure<F>(F);

impl<F> TextProcedure for FnTextProcedure<F>
where
    F: Fn(&dyn RequestHandler, &ServerRequest, String) -> String + Send + Sync,
{
    fn apply(&self, handler: &dyn RequestHandler, request: &ServerRequest, content: String) -> String {
        (self.0)(handler, request, content)
    }
}

/// Wraps a closure as a [`TextProcedure`].
pub fn text_procedure_fn<F>(f: F) -> impl TextProcedure
where
    F: Fn(&dyn RequestHandler, &ServerRequest, String) -> String + Send + Sync,
{
    FnTextProcedure(f)
}

struct FnByteProcedure<F>(F);

impl<F> ByteProcedure for FnByteProcedure<F>
where
    F: Fn(&dyn RequestHandler, &ServerRequest, Bytes) -> Bytes + Send + Sync,
{
    fn apply(&self, handler: &dyn RequestHandler, request: &ServerRequest, content: Bytes) -> Bytes {
        (self.0)(handler, request, content)
    }
}

/// Wraps a closure as a [`ByteProcedure`].
pub fn byte_procedure_fn<F>(f: F) -> impl ByteProcedure
where
    F: Fn(&dyn RequestHandler, &ServerRequest, Bytes) -> Bytes + Send + Sync,
{
    FnByteProcedure(f)
}

/// The frozen transformer registry shared by every worker.
#[derive(Default)]
pub struct ProcedureChain {
    text: Vec<Box<dyn TextProcedure>>,
    bytes: Vec<Box<dyn ByteProcedure>>,
}

impl fmt::Debug for ProcedureChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcedureChain")
            .field("text", &self.text.len())
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

impl ProcedureChain {
    pub fn builder() -> ProcedureChainBuilder {
        ProcedureChainBuilder { chain: ProcedureChain::default() }
    }

    /// A chain with no transformers registered.
    pub fn empty() -> Self {
        Self::default()
    }

    pub(crate) fn text_procedures(&self) -> &[Box<dyn TextProcedure>] {
        &self.text
    }

    pub(crate) fn byte_procedures(&self) -> &[Box<dyn ByteProcedure>] {
        &self.bytes
    }
}

/// Append-only registration; [`build`](Self::build) freezes the chain.
pub struct ProcedureChainBuilder {
    chain: ProcedureChain,
}

impl fmt::Debug for ProcedureChainBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcedureChainBuilder").field("chain", &self.chain).finish()
    }
}

impl ProcedureChainBuilder {
    pub fn text(mut self, procedure: impl TextProcedure + 'static) -> Self {
        self.chain.text.push(Box::new(procedure));
        self
    }

    pub fn bytes(mut self, procedure: impl ByteProcedure + 'static) -> Self {
        self.chain.bytes.push(Box::new(procedure));
        self
    }

    pub fn build(self) -> ProcedureChain {
        self.chain
    }
}

#[cfg(test)]
mod tests {
    use http::{HeaderMap, Method, Version};

    use super::*;
    use crate::handler::handler_fn;

    fn request() -> ServerRequest {
        ServerRequest::new(Method::GET, "/".parse().unwrap(), Version::HTTP_11, HeaderMap::new(), None)
    }

    #[test]
    fn text_procedures_run_in_registration_order() {
        let chain = ProcedureChain::builder()
            .text(text_procedure_fn(|_h, _r, content| content.to_uppercase()))
            .text(text_procedure_fn(|_h, _r, content| format!("{content}!")))
            .build();

        let handler = handler_fn("noop", |_req| Ok(None));
        let request = request();

        let mut content = String::from("hi");
        for procedure in chain.text_procedures() {
            content = procedure.apply(&handler, &request, content);
        }
        assert_eq!(content, "HI!");
    }

    #[test]
    fn byte_procedures_see_the_cumulative_result() {
        let chain = ProcedureChain::builder()
            .bytes(byte_procedure_fn(|_h, _r, content| {
                let mut out = content.to_vec();
                out.push(b'a');
                Bytes::from(out)
            }))
            .bytes(byte_procedure_fn(|_h, _r, content| {
                let mut out = content.to_vec();
                out.push(b'b');
                Bytes::from(out)
            }))
            .build();

        let handler = handler_fn("noop", |_req| Ok(None));
        let request = request();

        let mut content = Bytes::from_static(b"x");
        for procedure in chain.byte_procedures() {
            content = procedure.apply(&handler, &request, content);
        }
        assert_eq!(content, Bytes::from_static(b"xab"));
    }
}
