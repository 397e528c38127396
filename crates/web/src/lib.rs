//! The request-execution core of the ember server.

mod body;
mod error;
mod executor;
mod handler;
mod request;
mod server;

pub mod cache;
pub mod config;
pub mod encoding;
pub mod filter;
pub mod procedure;
pub mod router;
pub mod session;
pub mod validation;
pub mod worker;

pub use body::Content;
pub use body::ResponseBody;
pub use config::ServerConfig;
pub use error::EncodingError;
pub use error::HandlerError;
pub use error::WebError;
pub use handler::FnHandler;
pub use handler::NotFoundHandler;
pub use handler::RequestHandler;
pub use handler::handler_fn;
pub use request::MetaValue;
pub use request::ParamMap;
pub use request::ServerRequest;
pub use request::meta;
pub use router::Router;
pub use server::Server;
pub use server::ServerBuildError;
pub use server::ServerBuilder;
pub use server::ServerContext;
pub use server::ServerError;
pub use server::ServerHandle;
