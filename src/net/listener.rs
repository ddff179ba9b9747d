//! Listener binding.
//!
//! # Responsibilities
//! - Parse and bind configured addresses before anything is served
//! - Hand out std listeners ready for `axum-server`
//!
//! # Design Decisions
//! - Every listener is bound up front so a taken port fails startup
//!   instead of surfacing after other listeners already serve traffic
//! - Port 0 is allowed; the real port is read back from the socket

use std::io;
use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::TcpListener;

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("invalid {name} listener address {address:?}")]
    Address { name: &'static str, address: String },

    #[error("failed to bind {name} listener on {address}: {source}")]
    Bind {
        name: &'static str,
        address: String,
        #[source]
        source: io::Error,
    },
}

/// A bound socket not yet serving.
#[derive(Debug)]
pub struct BoundListener {
    name: &'static str,
    inner: std::net::TcpListener,
    local_addr: SocketAddr,
}

impl BoundListener {
    /// Bind `address` for the listener called `name`.
    pub async fn bind(name: &'static str, address: &str) -> Result<Self, ListenerError> {
        let addr: SocketAddr = address.trim().parse().map_err(|_| ListenerError::Address {
            name,
            address: address.to_string(),
        })?;

        let bind_err = |source: io::Error| ListenerError::Bind {
            name,
            address: address.to_string(),
            source,
        };

        let listener = TcpListener::bind(addr).await.map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;
        // tokio leaves the std socket non-blocking, which axum-server requires
        let inner = listener.into_std().map_err(bind_err)?;

        tracing::info!(listener = name, address = %local_addr, "Listener bound");

        Ok(Self {
            name,
            inner,
            local_addr,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn into_std(self) -> std::net::TcpListener {
        self.inner
    }
}
