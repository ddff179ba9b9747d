//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → network.rs (private or public caller)
//!     → rate_limit.rs (per-IP token bucket)
//!     → headers.rs (strip hop-by-hop, add X-Forwarded-*) on the way upstream
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any security check failure
//! - No trust in client input

pub mod headers;
pub mod network;
pub mod rate_limit;

pub use network::{classify, is_private, NetworkClass};
pub use rate_limit::{Limiter, RateLimiter};
