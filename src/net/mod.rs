//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Configured address
//!     → listener.rs (bind before serving, report real port)
//!     → tls.rs (secure listener only: certificate provider → rustls config)
//!     → connection.rs (wrap socket, log public closes)
//!     → Hand off to HTTP layer
//! ```

pub mod connection;
pub mod listener;
pub mod tls;

pub use connection::{ConnectionId, ObservedStream, ObservingAcceptor};
pub use listener::{BoundListener, ListenerError};
pub use tls::{upstream_tls_config, CertificateProvider, PemCertificates, TlsError};
