//! HTTP-FLV request/response handling
//!
//! - Reading the request header block off a transport
//! - Turning the request line into a routable [`StreamIdentity`]
//! - The fixed response preamble

pub mod constants;
pub mod identity;
pub mod request;
pub mod response;

pub use identity::{parse_identity, StreamIdentity};
pub use request::{parse_request_line, read_http_header, RequestHeader, RequestLine};
pub use response::HTTP_RESPONSE_HEADER;
