//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Start (http::server):
//!     Register routes → Bind every listener → Serve → Running
//!
//! Shutdown (shutdown.rs):
//!     Signal received → ShuttingDown → Drain listeners within grace → Stop sweep → Stopped
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Listeners start last (traffic only when ready)
//! - Shutdown has one deadline shared by every step
//! - Shutdown failures are logged, never fatal

pub mod shutdown;
pub mod signals;

use std::fmt;

pub use shutdown::Shutdown;
pub use signals::termination;

/// States of a running edge server, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Lifecycle {
    Created,
    Running,
    ShuttingDown,
    Stopped,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Lifecycle::Created => "created",
            Lifecycle::Running => "running",
            Lifecycle::ShuttingDown => "shutting_down",
            Lifecycle::Stopped => "stopped",
        };
        f.write_str(s)
    }
}
