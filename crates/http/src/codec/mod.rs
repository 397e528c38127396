//! Blocking encoding/decoding of HTTP/1.1 messages.

mod request_decoder;
mod response_encoder;

pub use request_decoder::{DecodedRequest, RequestDecoder};
pub use response_encoder::ResponseEncoder;
