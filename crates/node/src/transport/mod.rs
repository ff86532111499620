//! Transport seam.
//!
//! The node only needs a handful of capabilities from a secure multiplexed
//! transport: accept and dial connections, wait for handshakes, open and
//! accept bidirectional streams, observe termination, and close things.
//! These traits name exactly that surface so the lifecycle code is written
//! once and driven by QUIC in production and by an in-memory network in
//! tests.
//!
//! Every failure is reported as a [`TransportError`] kind; implementations
//! are responsible for mapping their native errors.

pub mod quic;

#[cfg(test)]
pub(crate) mod mem;

use async_trait::async_trait;
use corelib::TransportError;
use std::fmt::Debug;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite};

pub use quic::{QuicConnection, QuicPending, QuicTransport};

/// Result alias for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// A listening and dialing endpoint.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    type Conn: Connection;
    type Pending: Pending<Conn = Self::Conn>;

    /// Wait for the next inbound connection attempt.
    ///
    /// Must fail with [`TransportError::Closed`] once the listener is closed.
    /// Callers race this against the root cancellation signal, so it must be
    /// safe to drop mid-wait.
    async fn accept(&self) -> TransportResult<Self::Pending>;

    /// Establish a connection to `addr`, including the handshake.
    async fn dial(&self, addr: SocketAddr) -> TransportResult<Self::Conn>;

    fn local_addr(&self) -> TransportResult<SocketAddr>;

    /// Stop accepting new connections. Idempotent.
    fn close_listener(&self);

    /// Release the underlying socket. Called last during shutdown, after
    /// every connection has been closed.
    async fn release(&self);
}

/// An inbound connection that has not finished its handshake.
#[async_trait]
pub trait Pending: Send + 'static {
    type Conn: Connection;

    fn remote_addr(&self) -> SocketAddr;

    /// Resolve once the handshake completes, or fail if the connection
    /// terminates first.
    async fn complete(self) -> TransportResult<Self::Conn>;
}

/// An established connection. Clones refer to the same connection.
#[async_trait]
pub trait Connection: Clone + Debug + Send + Sync + 'static {
    type SendStream: AsyncWrite + Send + Unpin + 'static;
    type RecvStream: AsyncRead + Send + Unpin + 'static;

    /// Identity that stays stable for the lifetime of the connection.
    fn id(&self) -> usize;

    fn remote_addr(&self) -> SocketAddr;

    async fn open_stream(&self) -> TransportResult<(Self::SendStream, Self::RecvStream)>;

    async fn accept_stream(&self) -> TransportResult<(Self::SendStream, Self::RecvStream)>;

    /// Termination signal: resolves with the reason once the connection is gone.
    async fn closed(&self) -> TransportError;

    /// Close immediately with an application code. Does not wait for the peer.
    fn close(&self, code: u32, reason: &str);
}
