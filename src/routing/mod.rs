//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (Host header)
//!     → matcher.rs (normalize host, detect bare IPs)
//!     → table.rs (exact lookup, then defaults)
//!     → Return: Arc<Route> or nothing
//!
//! Registration (startup and runtime):
//!     RouteConfig
//!     → route.rs (normalize hosts, parse destination)
//!     → table.rs (conflict check, atomic insert)
//! ```
//!
//! # Design Decisions
//! - Exact host match only, no wildcards
//! - Routes are immutable once registered
//! - The special host `default` is a fallback, never matched literally

pub mod matcher;
pub mod route;
pub mod table;

pub use route::{Route, RouteError};
pub use table::RouteTable;
