//! In-memory transport for lifecycle tests.
//!
//! Listeners register on a shared [`MemNetwork`]; dialing creates a linked
//! pair of [`MemConnection`]s whose streams are `tokio::io::duplex` pipes.
//! Knobs on [`MemTransport`] inject the failures the node must survive.

use super::{Connection, Pending, Transport, TransportResult};
use async_trait::async_trait;
use corelib::TransportError;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;

const STREAM_BUFFER: usize = 64 * 1024;

type StreamPair = (WriteHalf<DuplexStream>, ReadHalf<DuplexStream>);

/// How a listener treats incoming handshakes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Handshake {
    Complete,
    Reject,
    /// Never completes; the pending attempt resolves only when the dialer
    /// closes its side.
    Stall,
}

struct Knobs {
    handshake: Mutex<Handshake>,
    stream_faults: Mutex<Vec<TransportError>>,
}

struct Listener {
    tx: mpsc::UnboundedSender<MemPending>,
    knobs: Arc<Knobs>,
}

/// Registry of listening in-memory transports.
#[derive(Default)]
pub(crate) struct MemNetwork {
    listeners: Mutex<HashMap<SocketAddr, Listener>>,
    next_id: AtomicUsize,
}

impl MemNetwork {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn bind(self: &Arc<Self>, addr: SocketAddr) -> MemTransport {
        let (tx, rx) = mpsc::unbounded_channel();
        let knobs = Arc::new(Knobs {
            handshake: Mutex::new(Handshake::Complete),
            stream_faults: Mutex::new(Vec::new()),
        });
        self.listeners.lock().insert(
            addr,
            Listener {
                tx,
                knobs: knobs.clone(),
            },
        );
        MemTransport {
            addr,
            network: self.clone(),
            incoming: AsyncMutex::new(rx),
            listener_closed: CancellationToken::new(),
            knobs,
            dial_delay: Mutex::new(Duration::ZERO),
            accept_faults: Mutex::new(VecDeque::new()),
            dials: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
        }
    }

    fn lookup(&self, addr: SocketAddr) -> Option<(mpsc::UnboundedSender<MemPending>, Arc<Knobs>)> {
        self.listeners
            .lock()
            .get(&addr)
            .map(|listener| (listener.tx.clone(), listener.knobs.clone()))
    }

    fn unregister(&self, addr: SocketAddr) {
        self.listeners.lock().remove(&addr);
    }

    fn next_id(&self) -> usize {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

pub(crate) struct MemTransport {
    addr: SocketAddr,
    network: Arc<MemNetwork>,
    incoming: AsyncMutex<mpsc::UnboundedReceiver<MemPending>>,
    listener_closed: CancellationToken,
    knobs: Arc<Knobs>,
    dial_delay: Mutex<Duration>,
    accept_faults: Mutex<VecDeque<TransportError>>,
    dials: AtomicUsize,
    releases: AtomicUsize,
}

impl MemTransport {
    pub(crate) fn set_dial_delay(&self, delay: Duration) {
        *self.dial_delay.lock() = delay;
    }

    pub(crate) fn set_handshake(&self, mode: Handshake) {
        *self.knobs.handshake.lock() = mode;
    }

    /// Queue errors returned by the next `accept` calls, in order.
    pub(crate) fn inject_accept_errors(&self, errors: impl IntoIterator<Item = TransportError>) {
        self.accept_faults.lock().extend(errors);
    }

    /// Errors every connection accepted from now on returns from its first
    /// `accept_stream` calls.
    pub(crate) fn inject_stream_errors(&self, errors: impl IntoIterator<Item = TransportError>) {
        self.knobs.stream_faults.lock().extend(errors);
    }

    pub(crate) fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    pub(crate) fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MemTransport {
    type Conn = MemConnection;
    type Pending = MemPending;

    async fn accept(&self) -> TransportResult<MemPending> {
        let fault = self.accept_faults.lock().pop_front();
        if let Some(err) = fault {
            return Err(err);
        }
        let mut incoming = self.incoming.lock().await;
        tokio::select! {
            _ = self.listener_closed.cancelled() => Err(TransportError::Closed),
            pending = incoming.recv() => pending.ok_or(TransportError::Closed),
        }
    }

    async fn dial(&self, addr: SocketAddr) -> TransportResult<MemConnection> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        let delay = *self.dial_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let (tx, knobs) = self
            .network
            .lookup(addr)
            .ok_or_else(|| TransportError::Io(format!("no listener at {addr}")))?;
        let (client, server) = MemConnection::pair(&self.network, self.addr, addr);
        server.push_faults(knobs.stream_faults.lock().clone());

        let mode = *knobs.handshake.lock();
        tx.send(MemPending { conn: server, mode })
            .map_err(|_| TransportError::Io(format!("listener at {addr} went away")))?;

        if mode == Handshake::Reject {
            let err = TransportError::Handshake("certificate rejected".into());
            client.0.link.terminate(err.clone());
            return Err(err);
        }
        Ok(client)
    }

    fn local_addr(&self) -> TransportResult<SocketAddr> {
        Ok(self.addr)
    }

    fn close_listener(&self) {
        self.listener_closed.cancel();
        self.network.unregister(self.addr);
    }

    async fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
        self.network.unregister(self.addr);
    }
}

pub(crate) struct MemPending {
    conn: MemConnection,
    mode: Handshake,
}

#[async_trait]
impl Pending for MemPending {
    type Conn = MemConnection;

    fn remote_addr(&self) -> SocketAddr {
        self.conn.0.remote
    }

    async fn complete(self) -> TransportResult<MemConnection> {
        match self.mode {
            Handshake::Complete => Ok(self.conn),
            Handshake::Reject => {
                let err = TransportError::Handshake("certificate rejected".into());
                self.conn.0.link.terminate(err.clone());
                Err(err)
            }
            Handshake::Stall => Err(self.conn.closed().await),
        }
    }
}

/// State shared by both ends of a connection.
struct Link {
    terminated: CancellationToken,
    reason: Mutex<Option<TransportError>>,
}

impl Link {
    fn terminate(&self, reason: TransportError) {
        self.reason.lock().get_or_insert(reason);
        self.terminated.cancel();
    }

    fn reason(&self) -> TransportError {
        self.reason
            .lock()
            .clone()
            .unwrap_or_else(|| TransportError::ConnectionLost("connection closed".into()))
    }
}

struct Side {
    id: usize,
    remote: SocketAddr,
    outgoing: mpsc::UnboundedSender<StreamPair>,
    incoming: AsyncMutex<mpsc::UnboundedReceiver<StreamPair>>,
    faults: Mutex<VecDeque<TransportError>>,
    link: Arc<Link>,
}

#[derive(Clone)]
pub(crate) struct MemConnection(Arc<Side>);

impl MemConnection {
    fn pair(network: &MemNetwork, client: SocketAddr, server: SocketAddr) -> (Self, Self) {
        let link = Arc::new(Link {
            terminated: CancellationToken::new(),
            reason: Mutex::new(None),
        });
        let (to_server, from_client) = mpsc::unbounded_channel();
        let (to_client, from_server) = mpsc::unbounded_channel();
        let client_side = Side {
            id: network.next_id(),
            remote: server,
            outgoing: to_server,
            incoming: AsyncMutex::new(from_server),
            faults: Mutex::new(VecDeque::new()),
            link: link.clone(),
        };
        let server_side = Side {
            id: network.next_id(),
            remote: client,
            outgoing: to_client,
            incoming: AsyncMutex::new(from_client),
            faults: Mutex::new(VecDeque::new()),
            link,
        };
        (Self(Arc::new(client_side)), Self(Arc::new(server_side)))
    }

    fn push_faults(&self, faults: Vec<TransportError>) {
        self.0.faults.lock().extend(faults);
    }

    /// Terminate without an application close, as a dropped peer would.
    pub(crate) fn sever(&self) {
        self.0
            .link
            .terminate(TransportError::ConnectionLost("peer went away".into()));
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.0.link.terminated.is_cancelled()
    }
}

impl fmt::Debug for MemConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemConnection")
            .field("id", &self.0.id)
            .field("remote", &self.0.remote)
            .finish()
    }
}

#[async_trait]
impl Connection for MemConnection {
    type SendStream = WriteHalf<DuplexStream>;
    type RecvStream = ReadHalf<DuplexStream>;

    fn id(&self) -> usize {
        self.0.id
    }

    fn remote_addr(&self) -> SocketAddr {
        self.0.remote
    }

    async fn open_stream(&self) -> TransportResult<StreamPair> {
        if self.is_terminated() {
            return Err(self.0.link.reason());
        }
        let (near, far) = tokio::io::duplex(STREAM_BUFFER);
        let (far_read, far_write) = tokio::io::split(far);
        self.0
            .outgoing
            .send((far_write, far_read))
            .map_err(|_| self.0.link.reason())?;
        let (near_read, near_write) = tokio::io::split(near);
        Ok((near_write, near_read))
    }

    async fn accept_stream(&self) -> TransportResult<StreamPair> {
        let fault = self.0.faults.lock().pop_front();
        if let Some(err) = fault {
            return Err(err);
        }
        let mut incoming = self.0.incoming.lock().await;
        tokio::select! {
            _ = self.0.link.terminated.cancelled() => Err(self.0.link.reason()),
            pair = incoming.recv() => {
                pair.ok_or_else(|| TransportError::ConnectionLost("peer dropped".into()))
            }
        }
    }

    async fn closed(&self) -> TransportError {
        self.0.link.terminated.cancelled().await;
        self.0.link.reason()
    }

    fn close(&self, code: u32, reason: &str) {
        self.0.link.terminate(TransportError::ApplicationClosed {
            code: code.into(),
            reason: reason.to_string(),
        });
    }
}
