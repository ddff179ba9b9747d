//! Host header extraction and normalization.
//!
//! # Design Decisions
//! - Host matching is exact but case-insensitive (RFC 9110 §4.2.3)
//! - The port, if the client sent one, is part of the key
//! - HTTP/2 clients carry the host in the `:authority` pseudo-header,
//!   which hyper exposes through the request URI

use std::net::IpAddr;

use axum::http::{header, Request};

/// Lowercase and trim a configured or received host name.
pub fn normalize_host(host: &str) -> String {
    host.trim().to_ascii_lowercase()
}

/// The host a request is addressed to, if it names one.
pub fn request_host<B>(req: &Request<B>) -> Option<&str> {
    req.headers()
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .or_else(|| req.uri().authority().map(|a| a.as_str()))
        .map(str::trim)
        .filter(|h| !h.is_empty())
}

/// True when the host is a bare IP literal, i.e. the client dialled an
/// address rather than a virtual host name.
pub fn is_bare_ip(host: &str) -> bool {
    let host = host.trim();
    let unbracketed = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    unbracketed.parse::<IpAddr>().is_ok()
}
