//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (axum-server, request id, tracing)
//!     → pipeline.rs (ordered stages from middleware/, may answer early)
//!     → dispatch.rs (bound route, Host lookup, defaults)
//!     → forward.rs (rewrite URI, strip hop-by-hop, stream upstream)
//!     → Send to client
//! ```

pub mod dispatch;
pub mod forward;
pub mod health;
pub mod middleware;
pub mod pipeline;
pub mod server;

pub use dispatch::Dispatcher;
pub use pipeline::{Flow, ListenerKind, Pipeline, RequestContext, Stage};
pub use server::{EdgeError, EdgeServer, RunningEdge};
