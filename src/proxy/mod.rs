//! Per-connection protocol drivers.
//!
//! - `Connection`: the read/write machinery shared by both sides
//! - `ClientConn`: the client-facing request loop and cache decision
//! - `origin`: the origin-facing exchange, cacheability test and store
//! - `Tunnel`: the opaque byte relay behind CONNECT

pub mod client;
pub mod connection;
pub mod origin;
pub mod tunnel;

pub use client::ClientConn;
pub use tunnel::Tunnel;

use crate::http::HttpMessage;

/// Stock `200 OK` written to the client when a CONNECT target accepts.
pub(crate) fn stock_200() -> HttpMessage {
    HttpMessage::new(["HTTP/1.1", "200", "OK"])
}

/// Stock `400 Invalid Request` for malformed client requests.
pub(crate) fn stock_400() -> HttpMessage {
    let mut msg = HttpMessage::new(["HTTP/1.1", "400", "Invalid Request"]);
    msg.replace_header("Content-Length", "0");
    msg
}

/// Stock `502 Bad Gateway` for upstream failures.
pub(crate) fn stock_502() -> HttpMessage {
    let mut msg = HttpMessage::new(["HTTP/1.1", "502", "Bad Gateway"]);
    msg.replace_header("Content-Length", "0");
    msg
}

/// Only HTTP/1.0 and HTTP/1.1 are acknowledged.
pub(crate) fn check_protocol(protocol: &str) -> bool {
    protocol == "HTTP/1.0" || protocol == "HTTP/1.1"
}
