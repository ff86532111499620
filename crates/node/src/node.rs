//! Node lifecycle.
//!
//! A [`Node`] owns one transport, a route table, the outbound pool and the
//! set of open inbound connections. Starting it spawns the accept loop;
//! stopping it (explicitly, through the parent cancellation token, or after
//! a fatal accept error) runs one teardown:
//!
//! 1. cancel the root token
//! 2. close the listener
//! 3. close every open inbound connection
//! 4. wait for the accept loop to exit
//! 5. close every pooled outbound connection
//! 6. release the transport
//!
//! Only the first trigger runs it; every other caller waits for it to finish.

use crate::config::{split_host_port, Limits, NodeConfig};
use crate::error::CallError;
use crate::pool::{call_on_connection, ConnectionPool};
use crate::session::{run_inbound, serve_streams, SERVER_SHUTDOWN};
use crate::tls::SecurityConfig;
use crate::transport::{Connection, Pending, QuicTransport, Transport};
use bytes::Bytes;
use corelib::{
    classify_accept, AcceptOutcome, Error, Headers, Request, Response, Result, Router,
    TransportError,
};
use dashmap::DashMap;
use parking_lot::Mutex;
use quinn::TransportConfig;
use std::fmt;
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Runs the teardown exactly once and lets late callers wait for it.
struct ShutdownGate {
    started: AtomicBool,
    done: watch::Sender<bool>,
}

impl ShutdownGate {
    fn new() -> Self {
        let (done, _) = watch::channel(false);
        Self {
            started: AtomicBool::new(false),
            done,
        }
    }

    /// True for exactly one caller.
    fn begin(&self) -> bool {
        self.started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn finish(&self) {
        self.done.send_replace(true);
    }

    async fn wait(&self) {
        let mut done = self.done.subscribe();
        // The sender lives as long as the gate, so this cannot fail.
        let _ = done.wait_for(|finished| *finished).await;
    }
}

pub(crate) struct Shared<T: Transport> {
    pub(crate) transport: Arc<T>,
    pub(crate) router: Router<T::Conn>,
    pub(crate) pool: ConnectionPool<T>,
    pub(crate) open: DashMap<usize, T::Conn>,
    pub(crate) cancel: CancellationToken,
    pub(crate) limits: Limits,
    gate: ShutdownGate,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Transport> Shared<T> {
    pub(crate) async fn shutdown(&self) {
        if !self.gate.begin() {
            self.gate.wait().await;
            return;
        }
        info!("node shutting down");

        self.cancel.cancel();
        self.transport.close_listener();

        // Sessions that register after this sweep see the cancelled token
        // and close themselves.
        let open: Vec<T::Conn> = self.open.iter().map(|entry| entry.value().clone()).collect();
        debug!(connections = open.len(), "closing inbound connections");
        for conn in open {
            conn.close(0, SERVER_SHUTDOWN);
        }

        let accept_task = self.accept_task.lock().take();
        if let Some(task) = accept_task {
            if let Err(err) = task.await {
                warn!(error = %err, "accept loop did not exit cleanly");
            }
        }

        self.pool.shutdown();
        self.transport.release().await;

        self.gate.finish();
        info!("node stopped");
    }
}

async fn accept_loop<T: Transport>(shared: Arc<Shared<T>>) {
    loop {
        let accepted = tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => Err(TransportError::Cancelled),
            accepted = shared.transport.accept() => accepted,
        };

        let err = match accepted {
            Ok(pending) => {
                debug!(remote = %pending.remote_addr(), "incoming connection");
                tokio::spawn(run_inbound(shared.clone(), pending));
                continue;
            }
            Err(err) => err,
        };

        match classify_accept(&err) {
            AcceptOutcome::Cancelled => {
                debug!("accept loop exiting: node cancelled");
                return;
            }
            AcceptOutcome::Closed => {
                info!("accept loop exiting: listener closed");
                return;
            }
            AcceptOutcome::Transient => {
                warn!(error = %err, "transient accept failure, backing off");
                tokio::select! {
                    _ = shared.cancel.cancelled() => return,
                    _ = tokio::time::sleep(shared.limits.accept_backoff) => {}
                }
            }
            AcceptOutcome::Fatal => {
                error!(error = %err, "fatal accept failure, shutting node down");
                let shared = shared.clone();
                tokio::spawn(async move { shared.shutdown().await });
                return;
            }
        }
    }
}

/// A running RPC node.
///
/// Cheap to clone; clones share the same node.
pub struct Node<T: Transport = QuicTransport> {
    shared: Arc<Shared<T>>,
}

impl<T: Transport> Clone for Node<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl Node<QuicTransport> {
    /// Validate `config`, bind the QUIC listener and start accepting.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    /// [`Error::Config`] for an invalid configuration, [`Error::Io`] if the
    /// socket cannot be bound.
    pub fn start(config: NodeConfig) -> Result<Self> {
        Self::start_with_cancel(config, &CancellationToken::new())
    }

    /// Like [`Node::start`], but the node also shuts down when `parent` is
    /// cancelled.
    pub fn start_with_cancel(config: NodeConfig, parent: &CancellationToken) -> Result<Self> {
        let valid = config.validated()?;
        let transport = QuicTransport::bind(valid.addr, valid.security, valid.transport)?;
        Ok(Self::launch(transport, config.limits, parent))
    }

    /// A node that only dials. Its accept loop exits immediately, but pooled
    /// connections still serve streams the peer opens.
    pub fn dialer(
        bind: SocketAddr,
        security: &SecurityConfig,
        transport: Arc<TransportConfig>,
        limits: Limits,
    ) -> Result<Self> {
        let transport = QuicTransport::dialer(bind, security, transport)?;
        Ok(Self::launch(transport, limits, &CancellationToken::new()))
    }
}

impl<T: Transport> Node<T> {
    /// Start a node over an already-bound transport.
    ///
    /// The node's root token is a child of `parent`.
    pub fn launch(transport: T, limits: Limits, parent: &CancellationToken) -> Self {
        let transport = Arc::new(transport);
        let cancel = parent.child_token();

        let shared = Arc::new_cyclic(|weak: &Weak<Shared<T>>| {
            let weak = weak.clone();
            let pool = ConnectionPool::new(transport.clone(), limits, cancel.clone()).on_connect(
                move |conn| {
                    if let Some(shared) = weak.upgrade() {
                        tokio::spawn(async move {
                            serve_streams(&shared, &conn).await;
                        });
                    }
                },
            );
            Shared {
                transport,
                router: Router::new(),
                pool,
                open: DashMap::new(),
                cancel: cancel.clone(),
                limits,
                gate: ShutdownGate::new(),
                accept_task: Mutex::new(None),
            }
        });

        {
            // Held across the spawn so a fatal first accept cannot reach
            // shutdown before the handle is stored.
            let mut slot = shared.accept_task.lock();
            *slot = Some(tokio::spawn(accept_loop(shared.clone())));
        }

        let watcher = shared.clone();
        tokio::spawn(async move {
            watcher.cancel.cancelled().await;
            watcher.shutdown().await;
        });

        match shared.transport.local_addr() {
            Ok(addr) => info!(%addr, "node started"),
            Err(err) => info!(error = %err, "node started without a local address"),
        }
        Self { shared }
    }

    /// Register `handler` for `route`. Later registrations replace earlier ones.
    pub fn handle<F, Fut>(&self, route: impl Into<String>, handler: F)
    where
        F: Fn(Request<T::Conn>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        self.shared.router.add_route(route, handler);
    }

    /// Call `route` on the node at `addr` (`host:port`).
    ///
    /// # Errors
    /// A [`CallError`] with a synthesized `500` if the address is invalid or
    /// the exchange fails.
    pub async fn call(
        &self,
        addr: &str,
        route: &str,
        headers: Headers,
        body: impl Into<Bytes>,
    ) -> std::result::Result<Response, CallError> {
        let destination = resolve_destination(addr).await?;
        let request = Request::<()>::new(route)
            .with_headers(headers)
            .with_body(body);
        self.send(destination, request).await
    }

    /// Send a fully built request through the pool.
    pub async fn send<X>(
        &self,
        destination: SocketAddr,
        request: Request<X>,
    ) -> std::result::Result<Response, CallError>
    where
        X: Send + Sync,
    {
        self.shared.pool.call(destination, request).await
    }

    /// Call `route` over `conn` instead of a pooled connection, typically
    /// the connection an inbound request arrived on.
    ///
    /// # Errors
    /// [`Error::MissingConnection`] (with a `500`) when `conn` is `None`.
    pub async fn call_on(
        &self,
        conn: Option<&T::Conn>,
        route: &str,
        headers: Headers,
        body: impl Into<Bytes>,
    ) -> std::result::Result<Response, CallError> {
        let mut request = Request::<()>::new(route)
            .with_headers(headers)
            .with_body(body);
        request.destination = conn.map(|conn| conn.remote_addr());
        call_on_connection(conn, &request, &self.shared.limits, &self.shared.cancel).await
    }

    /// Shut the node down and wait for the teardown to finish. Idempotent.
    pub async fn stop(&self) {
        self.shared.shutdown().await;
    }

    /// Wait until the node has shut down, whatever triggered it.
    pub async fn closed(&self) {
        self.shared.gate.wait().await;
    }

    /// True once shutdown has begun.
    pub(crate) fn is_stopped(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.shared.transport.local_addr().map_err(Error::from)
    }

    /// Number of inbound connections currently being served.
    pub fn open_connections(&self) -> usize {
        self.shared.open.len()
    }

    pub fn pool(&self) -> &ConnectionPool<T> {
        &self.shared.pool
    }

    #[cfg(test)]
    pub(crate) fn transport(&self) -> &T {
        &self.shared.transport
    }
}

impl<T: Transport> fmt::Debug for Node<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("local_addr", &self.shared.transport.local_addr().ok())
            .field("open_connections", &self.open_connections())
            .field("pooled", &self.shared.pool.len())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Validate and resolve an outbound `host:port`. An empty host means loopback.
async fn resolve_destination(addr: &str) -> Result<SocketAddr> {
    let (host, port) = split_host_port(addr)?;
    if host.is_empty() {
        return Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port));
    }
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }
    tokio::net::lookup_host((host, port))
        .await
        .map_err(|err| Error::Config(format!("cannot resolve {host:?}: {err}")))?
        .next()
        .ok_or_else(|| Error::Config(format!("{host:?} resolved to no addresses")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::exchange;
    use crate::session::SESSION_ENDED;
    use crate::transport::mem::{Handshake, MemConnection, MemNetwork, MemTransport};
    use corelib::codec;
    use std::time::Duration;
    use tokio::io::{AsyncWriteExt, BufReader};

    // ========================================================================
    // Helpers
    // ========================================================================

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn fast_limits() -> Limits {
        Limits {
            dial_timeout: Duration::from_secs(1),
            stream_timeout: Duration::from_secs(1),
            accept_backoff: Duration::from_millis(10),
            stream_backoff: Duration::from_millis(5),
            ..Limits::default()
        }
    }

    fn launch(transport: MemTransport) -> Node<MemTransport> {
        Node::launch(transport, fast_limits(), &CancellationToken::new())
    }

    fn pair(network: &Arc<MemNetwork>) -> (Node<MemTransport>, Node<MemTransport>) {
        let server = launch(network.bind(addr(1)));
        server.handle("ping", |_| async { Response::ok("pong") });
        let client = launch(network.bind(addr(2)));
        (server, client)
    }

    async fn eventually(what: &str, check: impl Fn() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("timed out waiting for {what}");
    }

    async fn within<F: Future>(what: &str, fut: F) -> F::Output {
        tokio::time::timeout(Duration::from_secs(2), fut)
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
    }

    // ========================================================================
    // Calls
    // ========================================================================

    #[tokio::test]
    async fn test_call_round_trip() {
        let network = MemNetwork::new();
        let (server, client) = pair(&network);

        let response = client
            .call("127.0.0.1:1", "ping", Headers::new(), Bytes::new())
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(&response.body[..], b"pong");

        assert_eq!(client.pool().len(), 1);
        eventually("server session", || server.open_connections() == 1).await;
    }

    #[tokio::test]
    async fn test_handler_sees_source_and_connection() {
        let network = MemNetwork::new();
        let (server, client) = pair(&network);
        server.handle("whoami", |request: Request<MemConnection>| async move {
            let source = request.source.map(|addr| addr.to_string()).unwrap_or_default();
            let has_conn = request.connection.is_some();
            Response::ok(format!("{source} {has_conn}"))
        });

        let response = client
            .call("127.0.0.1:1", "whoami", Headers::new(), "")
            .await
            .unwrap();
        assert_eq!(&response.body[..], b"127.0.0.1:2 true");
    }

    #[tokio::test]
    async fn test_unregistered_route_gets_404() {
        let network = MemNetwork::new();
        let (_server, client) = pair(&network);

        let response = client
            .call("127.0.0.1:1", "missing", Headers::new(), "")
            .await
            .unwrap();
        assert_eq!(response.status, 404);
        assert_eq!(response.message, "Not Found");
        assert_eq!(&response.body[..], b"route not found");
    }

    #[tokio::test]
    async fn test_invalid_address_synthesizes_500() {
        let network = MemNetwork::new();
        let (_server, client) = pair(&network);

        for bad in ["127.0.0.1", "127.0.0.1:0", "127.0.0.1:99999"] {
            let err = client
                .call(bad, "ping", Headers::new(), "")
                .await
                .unwrap_err();
            assert!(matches!(err.error(), Error::Config(_)), "{bad:?}: {err}");
            assert_eq!(err.response().status, 500);
        }
        assert!(client.pool().is_empty());
    }

    #[tokio::test]
    async fn test_call_on_without_connection() {
        let network = MemNetwork::new();
        let (_server, client) = pair(&network);

        let err = client
            .call_on(None, "ping", Headers::new(), "")
            .await
            .unwrap_err();
        assert!(matches!(err.error(), Error::MissingConnection));
        assert_eq!(err.response().status, 500);
    }

    #[tokio::test]
    async fn test_reply_over_inbound_connection() {
        let network = MemNetwork::new();
        let (server, client) = pair(&network);
        client.handle("answer", |_| async { Response::ok("from client") });

        let node = server.clone();
        server.handle("ask", move |request: Request<MemConnection>| {
            let node = node.clone();
            async move {
                match node
                    .call_on(request.connection.as_ref(), "answer", Headers::new(), "")
                    .await
                {
                    Ok(answer) => Response::ok(answer.body),
                    Err(err) => err.into_response(),
                }
            }
        });

        let response = client
            .call("127.0.0.1:1", "ask", Headers::new(), "")
            .await
            .unwrap();
        assert_eq!(&response.body[..], b"from client");
        assert_eq!(
            client.open_connections(),
            0,
            "pooled connections are not inbound sessions"
        );
    }

    // ========================================================================
    // Sessions
    // ========================================================================

    #[tokio::test]
    async fn test_malformed_request_gets_400_and_session_survives() {
        let network = MemNetwork::new();
        let (_server, _client) = pair(&network);
        let raw = network.bind(addr(3));
        let conn = raw.dial(addr(1)).await.unwrap();

        let (mut send, recv) = conn.open_stream().await.unwrap();
        send.write_all(b"only-one-token\r\n\r\n").await.unwrap();
        send.shutdown().await.unwrap();
        let mut reader = BufReader::new(recv);
        let response = codec::read_response(&mut reader, &Default::default())
            .await
            .unwrap();
        assert_eq!(response.status, 400);
        assert_eq!(response.message, "Bad Request");
        assert!(
            String::from_utf8_lossy(&response.body).contains("invalid request line"),
            "body should carry the parse error"
        );

        let response = exchange(
            &conn,
            &Request::<()>::new("ping"),
            &fast_limits(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(&response.body[..], b"pong");
    }

    #[tokio::test]
    async fn test_transient_stream_error_keeps_session() {
        let network = MemNetwork::new();
        let (server, client) = pair(&network);
        server
            .transport()
            .inject_stream_errors([TransportError::Transient("stream limit".into())]);

        let response = client
            .call("127.0.0.1:1", "ping", Headers::new(), "")
            .await
            .unwrap();
        assert_eq!(&response.body[..], b"pong");
    }

    #[tokio::test]
    async fn test_unrecognized_stream_error_ends_session() {
        let network = MemNetwork::new();
        let (server, _client) = pair(&network);
        server
            .transport()
            .inject_stream_errors([TransportError::Io("unexpected".into())]);

        let raw = network.bind(addr(3));
        let conn = raw.dial(addr(1)).await.unwrap();
        assert_eq!(
            within("session close", conn.closed()).await,
            TransportError::ApplicationClosed {
                code: 0,
                reason: SESSION_ENDED.into()
            }
        );
        eventually("session removal", || server.open_connections() == 0).await;
    }

    #[tokio::test]
    async fn test_rejected_handshake_is_not_registered() {
        let network = MemNetwork::new();
        let (server, client) = pair(&network);
        server.transport().set_handshake(Handshake::Reject);

        let err = client
            .call("127.0.0.1:1", "ping", Headers::new(), "")
            .await
            .unwrap_err();
        assert!(matches!(
            err.error(),
            Error::Transport(TransportError::Handshake(_))
        ));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(server.open_connections(), 0);
        assert!(!server.is_stopped(), "a handshake failure must not stop the node");
    }

    #[tokio::test]
    async fn test_stalled_handshake_abandoned_on_stop() {
        let network = MemNetwork::new();
        let (server, _client) = pair(&network);
        server.transport().set_handshake(Handshake::Stall);

        let raw = network.bind(addr(3));
        let _conn = raw.dial(addr(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        within("stop", server.stop()).await;
        assert_eq!(server.open_connections(), 0);
        assert_eq!(server.transport().releases(), 1);
    }

    // ========================================================================
    // Accept Loop
    // ========================================================================

    #[tokio::test]
    async fn test_transient_accept_errors_are_retried() {
        let network = MemNetwork::new();
        let transport = network.bind(addr(1));
        transport.inject_accept_errors([
            TransportError::Transient("too many open files".into()),
            TransportError::Transient("too many open files".into()),
        ]);
        let server = launch(transport);
        server.handle("ping", |_| async { Response::ok("pong") });
        let client = launch(network.bind(addr(2)));

        let response = client
            .call("127.0.0.1:1", "ping", Headers::new(), "")
            .await
            .unwrap();
        assert_eq!(&response.body[..], b"pong");
        assert!(!server.is_stopped());
    }

    #[tokio::test]
    async fn test_fatal_accept_error_stops_node() {
        let network = MemNetwork::new();
        let transport = network.bind(addr(1));
        transport.inject_accept_errors([TransportError::Io("socket gone".into())]);
        let server = launch(transport);

        within("fatal shutdown", server.closed()).await;
        assert!(server.is_stopped());
        assert_eq!(server.transport().releases(), 1);
        assert!(
            server.shared.accept_task.lock().is_none(),
            "teardown should have joined the accept loop"
        );
    }

    #[tokio::test]
    async fn test_closed_listener_exits_without_shutdown() {
        let network = MemNetwork::new();
        let transport = network.bind(addr(1));
        transport.inject_accept_errors([TransportError::Closed]);
        let server = launch(transport);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!server.is_stopped());
        assert_eq!(server.transport().releases(), 0);
        server.stop().await;
        assert_eq!(server.transport().releases(), 1);
    }

    // ========================================================================
    // Shutdown
    // ========================================================================

    #[tokio::test]
    async fn test_concurrent_shutdown_runs_once() {
        let network = MemNetwork::new();
        let parent = CancellationToken::new();
        let server = Node::launch(network.bind(addr(1)), fast_limits(), &parent);

        let stops: Vec<_> = (0..4)
            .map(|_| {
                let node = server.clone();
                tokio::spawn(async move { node.stop().await })
            })
            .collect();
        parent.cancel();
        for stop in stops {
            within("stop", stop).await.unwrap();
        }

        assert_eq!(server.transport().releases(), 1);
        within("repeat stop", server.stop()).await;
        assert_eq!(server.transport().releases(), 1);
    }

    #[tokio::test]
    async fn test_parent_cancel_stops_node() {
        let network = MemNetwork::new();
        let parent = CancellationToken::new();
        let server = Node::launch(network.bind(addr(1)), fast_limits(), &parent);

        parent.cancel();
        within("parent shutdown", server.closed()).await;
        assert_eq!(server.transport().releases(), 1);
    }

    #[tokio::test]
    async fn test_stop_closes_inbound_connections() {
        let network = MemNetwork::new();
        let (server, client) = pair(&network);
        client
            .call("127.0.0.1:1", "ping", Headers::new(), "")
            .await
            .unwrap();
        let pooled = client.pool().get(addr(1)).unwrap();

        server.stop().await;
        assert_eq!(
            within("close", pooled.closed()).await,
            TransportError::ApplicationClosed {
                code: 0,
                reason: SERVER_SHUTDOWN.into()
            }
        );
        eventually("client eviction", || client.pool().is_empty()).await;

        let err = client
            .call("127.0.0.1:1", "ping", Headers::new(), "")
            .await
            .unwrap_err();
        assert_eq!(err.response().status, 500);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_parent_cancel_closes_inbound_connections() {
        let network = MemNetwork::new();
        let parent = CancellationToken::new();
        let server = Node::launch(network.bind(addr(1)), fast_limits(), &parent);
        server.handle("ping", |_| async { Response::ok("pong") });

        let raw = network.bind(addr(3));
        let mut conns = Vec::new();
        for _ in 0..3 {
            conns.push(raw.dial(addr(1)).await.unwrap());
        }
        eventually("server sessions", || server.open_connections() == 3).await;

        parent.cancel();
        for conn in &conns {
            assert_eq!(
                within("close", conn.closed()).await,
                TransportError::ApplicationClosed {
                    code: 0,
                    reason: SERVER_SHUTDOWN.into()
                },
                "every inbound connection should carry the server shutdown reason"
            );
        }
        within("shutdown", server.closed()).await;
        assert_eq!(server.open_connections(), 0);
    }

    #[tokio::test]
    async fn test_stop_closes_pooled_connections() {
        let network = MemNetwork::new();
        let (server, client) = pair(&network);
        client
            .call("127.0.0.1:1", "ping", Headers::new(), "")
            .await
            .unwrap();
        eventually("server session", || server.open_connections() == 1).await;

        client.stop().await;
        eventually("server session end", || server.open_connections() == 0).await;

        let err = client
            .call("127.0.0.1:1", "ping", Headers::new(), "")
            .await
            .unwrap_err();
        assert!(matches!(
            err.error(),
            Error::Transport(TransportError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_resolve_destination() {
        assert_eq!(
            resolve_destination(":7000").await.unwrap(),
            "127.0.0.1:7000".parse().unwrap()
        );
        assert_eq!(
            resolve_destination("[::1]:7000").await.unwrap(),
            "[::1]:7000".parse().unwrap()
        );
        assert!(resolve_destination("no-port").await.is_err());
    }
}
