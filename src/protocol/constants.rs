//! HTTP-FLV protocol constants

/// The only request method a subscriber may use
pub const READ_METHOD: &str = "GET";

/// Path suffix every subscribe request must carry
pub const FLV_EXTENSION: &str = ".flv";

/// Value of the `Server` response header
pub const SERVER_NAME: &str = concat!("httpflv-rs/", env!("CARGO_PKG_VERSION"));

/// Default maximum size of a request header block (request line included)
pub const DEFAULT_MAX_HEADER_SIZE: usize = 8 * 1024;

/// Chunk size used when pulling the request header off the transport
pub const HEADER_READ_CHUNK: usize = 1024;

/// Default port for HTTP-FLV servers
pub const DEFAULT_PORT: u16 = 8080;
