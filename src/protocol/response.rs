//! Fixed HTTP response sent to every accepted subscriber

/// Response preamble written before the FLV header
///
/// Identical for every session: status 200, no caching, CORS open, and
/// `Connection: close` since the body runs until either side hangs up.
pub const HTTP_RESPONSE_HEADER: &[u8] = concat!(
    "HTTP/1.1 200 OK\r\n",
    "Server: httpflv-rs/",
    env!("CARGO_PKG_VERSION"),
    "\r\n",
    "Cache-Control: no-cache\r\n",
    "Content-Type: video/x-flv\r\n",
    "Connection: close\r\n",
    "Expires: -1\r\n",
    "Pragma: no-cache\r\n",
    "Access-Control-Allow-Origin: *\r\n",
    "\r\n",
)
.as_bytes();
