//! Connection observation.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Log when a connection from a public address closes
//!
//! The observer never changes behavior; it only wraps the socket and
//! reports on drop.

use std::future::{ready, Ready};
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use axum_server::accept::Accept;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;

use crate::security::{classify, NetworkClass};

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A TCP stream that reports its own close.
#[derive(Debug)]
pub struct ObservedStream {
    inner: TcpStream,
    id: ConnectionId,
    remote: SocketAddr,
    local: SocketAddr,
}

impl ObservedStream {
    pub fn new(inner: TcpStream) -> io::Result<Self> {
        let remote = inner.peer_addr()?;
        let local = inner.local_addr()?;
        Ok(Self {
            inner,
            id: ConnectionId::new(),
            remote,
            local,
        })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }
}

impl Drop for ObservedStream {
    fn drop(&mut self) {
        if classify(self.remote.ip()) == NetworkClass::Public {
            tracing::info!(
                ip = %self.remote.ip(),
                local_addr = %self.local,
                state = "closed",
                connection_id = %self.id,
                "Closed remote connection"
            );
        } else {
            tracing::trace!(connection_id = %self.id, "Connection closed");
        }
    }
}

impl AsyncRead for ObservedStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for ObservedStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// `axum-server` acceptor wrapping every accepted socket in an
/// [`ObservedStream`]. Composes under the rustls acceptor.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObservingAcceptor;

impl<S> Accept<TcpStream, S> for ObservingAcceptor {
    type Stream = ObservedStream;
    type Service = S;
    type Future = Ready<io::Result<(Self::Stream, Self::Service)>>;

    fn accept(&self, stream: TcpStream, service: S) -> Self::Future {
        ready(ObservedStream::new(stream).map(|observed| {
            tracing::trace!(
                connection_id = %observed.id(),
                remote = %observed.remote_addr(),
                "Connection accepted"
            );
            (observed, service)
        }))
    }
}
