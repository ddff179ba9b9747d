//! Caller network classification.
//!
//! Private callers (RFC 1918 IPv4, RFC 4193 unique-local IPv6) get the
//! internal rate budget and skip the HTTPS upgrade. Loopback and link-local
//! addresses are not private.

use std::net::IpAddr;

/// Which budget and checks apply to a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkClass {
    Private,
    Public,
}

impl NetworkClass {
    /// Label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkClass::Private => "internal",
            NetworkClass::Public => "external",
        }
    }
}

/// Classify a caller address. IPv4-mapped IPv6 addresses are judged as IPv4.
pub fn classify(ip: IpAddr) -> NetworkClass {
    if is_private(ip) {
        NetworkClass::Private
    } else {
        NetworkClass::Public
    }
}

/// True for private-network addresses.
pub fn is_private(ip: IpAddr) -> bool {
    match ip.to_canonical() {
        IpAddr::V4(v4) => v4.is_private(),
        IpAddr::V6(v6) => (v6.segments()[0] & 0xfe00) == 0xfc00,
    }
}
