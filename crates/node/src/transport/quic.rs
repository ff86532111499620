//! QUIC transport over `quinn`.
//!
//! One [`quinn::Endpoint`] serves both roles: it listens with the server
//! crypto config and dials with the client crypto config as its default.
//! A dial-only endpoint ([`QuicTransport::dialer`]) has no server side and
//! its `accept` reports [`TransportError::Closed`] straight away.
//!
//! # Error Mapping
//!
//! | quinn                                  | `TransportError`      |
//! |----------------------------------------|-----------------------|
//! | crypto transport codes, version mismatch | `Handshake`         |
//! | `ApplicationClosed`                    | `ApplicationClosed`   |
//! | `ConnectionClosed`, `Reset`, `TimedOut`, `LocallyClosed` | `ConnectionLost` |
//! | `CidsExhausted`                        | `Transient`           |
//! | `EndpointStopping`                     | `Closed`              |

use super::{Connection, Pending, Transport, TransportResult};
use crate::tls::SecurityConfig;
use async_trait::async_trait;
use corelib::{Error, Result, TransportError};
use quinn::{
    ConnectError, ConnectionError, Endpoint, Incoming, RecvStream, SendStream, TransportConfig,
    VarInt,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Upper bound on draining connections when the socket is released.
const RELEASE_GRACE: Duration = Duration::from_secs(2);

/// A quinn endpoint behind the [`Transport`] seam.
#[derive(Debug, Clone)]
pub struct QuicTransport {
    endpoint: Endpoint,
    server_name: String,
    listening: bool,
    listener_closed: CancellationToken,
}

impl QuicTransport {
    /// Bind a listening endpoint on `addr`.
    ///
    /// `transport` is applied to both the server and the client side so
    /// inbound and outbound connections share idle timeouts and stream limits.
    ///
    /// # Errors
    /// - [`Error::Config`] if `security` has no server identity
    /// - [`Error::Io`] if the UDP socket cannot be bound
    pub fn bind(
        addr: SocketAddr,
        security: &SecurityConfig,
        transport: Arc<TransportConfig>,
    ) -> Result<Self> {
        let mut server = security
            .server
            .clone()
            .ok_or_else(|| Error::Config("a listening node needs a server identity".into()))?;
        server.transport_config(transport.clone());
        let mut client = security.client.clone();
        client.transport_config(transport);

        let mut endpoint = Endpoint::server(server, addr)?;
        endpoint.set_default_client_config(client);
        Ok(Self {
            endpoint,
            server_name: security.server_name.clone(),
            listening: true,
            listener_closed: CancellationToken::new(),
        })
    }

    /// Bind a dial-only endpoint on `addr`.
    pub fn dialer(
        addr: SocketAddr,
        security: &SecurityConfig,
        transport: Arc<TransportConfig>,
    ) -> Result<Self> {
        let mut client = security.client.clone();
        client.transport_config(transport);

        let mut endpoint = Endpoint::client(addr)?;
        endpoint.set_default_client_config(client);
        Ok(Self {
            endpoint,
            server_name: security.server_name.clone(),
            listening: false,
            listener_closed: CancellationToken::new(),
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for QuicTransport {
    type Conn = QuicConnection;
    type Pending = QuicPending;

    async fn accept(&self) -> TransportResult<QuicPending> {
        if !self.listening {
            return Err(TransportError::Closed);
        }
        tokio::select! {
            _ = self.listener_closed.cancelled() => Err(TransportError::Closed),
            incoming = self.endpoint.accept() => {
                incoming.map(QuicPending).ok_or(TransportError::Closed)
            }
        }
    }

    async fn dial(&self, addr: SocketAddr) -> TransportResult<QuicConnection> {
        let connecting = self
            .endpoint
            .connect(addr, &self.server_name)
            .map_err(map_connect_error)?;
        let connection = connecting.await.map_err(map_connection_error)?;
        Ok(QuicConnection(connection))
    }

    fn local_addr(&self) -> TransportResult<SocketAddr> {
        self.endpoint
            .local_addr()
            .map_err(|err| TransportError::Io(err.to_string()))
    }

    fn close_listener(&self) {
        if self.listening {
            self.endpoint.set_server_config(None);
        }
        self.listener_closed.cancel();
    }

    async fn release(&self) {
        self.endpoint.close(VarInt::from_u32(0), b"node shutdown");
        if tokio::time::timeout(RELEASE_GRACE, self.endpoint.wait_idle())
            .await
            .is_err()
        {
            debug!("endpoint did not drain before release grace expired");
        }
    }
}

/// Inbound QUIC connection attempt.
#[derive(Debug)]
pub struct QuicPending(Incoming);

#[async_trait]
impl Pending for QuicPending {
    type Conn = QuicConnection;

    fn remote_addr(&self) -> SocketAddr {
        self.0.remote_address()
    }

    async fn complete(self) -> TransportResult<QuicConnection> {
        let connecting = self.0.accept().map_err(map_connection_error)?;
        let connection = connecting.await.map_err(map_connection_error)?;
        Ok(QuicConnection(connection))
    }
}

/// Established QUIC connection.
#[derive(Debug, Clone)]
pub struct QuicConnection(quinn::Connection);

impl QuicConnection {
    pub fn inner(&self) -> &quinn::Connection {
        &self.0
    }
}

#[async_trait]
impl Connection for QuicConnection {
    type SendStream = SendStream;
    type RecvStream = RecvStream;

    fn id(&self) -> usize {
        self.0.stable_id()
    }

    fn remote_addr(&self) -> SocketAddr {
        self.0.remote_address()
    }

    async fn open_stream(&self) -> TransportResult<(SendStream, RecvStream)> {
        self.0.open_bi().await.map_err(map_connection_error)
    }

    async fn accept_stream(&self) -> TransportResult<(SendStream, RecvStream)> {
        self.0.accept_bi().await.map_err(map_connection_error)
    }

    async fn closed(&self) -> TransportError {
        map_connection_error(self.0.closed().await)
    }

    fn close(&self, code: u32, reason: &str) {
        self.0.close(VarInt::from_u32(code), reason.as_bytes());
    }
}

/// TLS alerts travel as transport error codes 0x100..=0x1ff.
fn is_crypto_failure(err: &quinn_proto::TransportError) -> bool {
    (0x100..=0x1ff).contains(&u64::from(err.code))
}

pub(crate) fn map_connection_error(err: ConnectionError) -> TransportError {
    match err {
        ConnectionError::VersionMismatch => {
            TransportError::Handshake("QUIC version mismatch".into())
        }
        ConnectionError::TransportError(err) if is_crypto_failure(&err) => {
            TransportError::Handshake(err.to_string())
        }
        ConnectionError::TransportError(err) => TransportError::ConnectionLost(err.to_string()),
        ConnectionError::ConnectionClosed(close) => {
            TransportError::ConnectionLost(close.to_string())
        }
        ConnectionError::ApplicationClosed(close) => TransportError::ApplicationClosed {
            code: close.error_code.into_inner(),
            reason: String::from_utf8_lossy(&close.reason).into_owned(),
        },
        ConnectionError::Reset => TransportError::ConnectionLost("reset by peer".into()),
        ConnectionError::TimedOut => TransportError::ConnectionLost("idle timeout".into()),
        ConnectionError::LocallyClosed => TransportError::ConnectionLost("closed locally".into()),
        ConnectionError::CidsExhausted => {
            TransportError::Transient("connection IDs exhausted".into())
        }
        #[allow(unreachable_patterns)]
        other => TransportError::Io(other.to_string()),
    }
}

fn map_connect_error(err: ConnectError) -> TransportError {
    match err {
        ConnectError::EndpointStopping => TransportError::Closed,
        ConnectError::CidsExhausted => {
            TransportError::Transient("connection IDs exhausted".into())
        }
        other => TransportError::Io(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use quinn::{ApplicationClose, TransportErrorCode};

    #[test]
    fn test_application_close_keeps_code_and_reason() {
        let err = map_connection_error(ConnectionError::ApplicationClosed(ApplicationClose {
            error_code: VarInt::from_u32(7),
            reason: Bytes::from_static(b"done"),
        }));
        assert_eq!(
            err,
            TransportError::ApplicationClosed {
                code: 7,
                reason: "done".into()
            }
        );
    }

    #[test]
    fn test_crypto_codes_are_handshake_failures() {
        let err = quinn_proto::TransportError {
            code: TransportErrorCode::crypto(42),
            frame: None,
            reason: "bad certificate".into(),
        };
        assert!(matches!(
            map_connection_error(ConnectionError::TransportError(err)),
            TransportError::Handshake(_)
        ));
    }

    #[test]
    fn test_connection_end_kinds() {
        assert!(matches!(
            map_connection_error(ConnectionError::TimedOut),
            TransportError::ConnectionLost(_)
        ));
        assert!(matches!(
            map_connection_error(ConnectionError::CidsExhausted),
            TransportError::Transient(_)
        ));
        assert_eq!(
            map_connect_error(ConnectError::EndpointStopping),
            TransportError::Closed
        );
    }
}
