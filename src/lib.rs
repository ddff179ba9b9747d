//! Name-based virtual host edge router.
//!
//! Terminates TLS for registered hostnames, forwards each host to one
//! upstream, and guards the edge with per-client rate limiting and a fixed
//! admission pipeline.

pub mod auth;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod routing;
pub mod security;

pub use config::schema::EdgeConfig;
pub use http::{EdgeError, EdgeServer, RunningEdge};
pub use lifecycle::{Lifecycle, Shutdown};
