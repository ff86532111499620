//! Outbound connection pool.
//!
//! At most one live connection is kept per destination. Concurrent callers
//! that miss the pool may each dial; the first to insert wins and the rest
//! close their duplicate and reuse the winner. A watcher task evicts an
//! entry once its connection terminates, but only if the entry still holds
//! that same connection.
//!
//! Every call runs one request/response exchange on a fresh stream.

use crate::config::Limits;
use crate::error::CallError;
use crate::transport::{Connection, Transport};
use corelib::{codec, Error, Request, Response, Result, TransportError};
use metrics::counter;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

type ConnectHook<C> = Box<dyn Fn(C) + Send + Sync>;

/// Normalize a destination so IPv4-mapped IPv6 addresses and their IPv4
/// form share one pool entry.
pub fn destination_key(addr: SocketAddr) -> SocketAddr {
    SocketAddr::new(addr.ip().to_canonical(), addr.port())
}

pub struct ConnectionPool<T: Transport> {
    transport: Arc<T>,
    entries: Arc<Mutex<HashMap<SocketAddr, T::Conn>>>,
    limits: Limits,
    cancel: CancellationToken,
    on_connect: Option<ConnectHook<T::Conn>>,
}

impl<T: Transport> ConnectionPool<T> {
    /// Pool dialing through `transport`. Dials and exchanges are abandoned
    /// once `cancel` fires.
    pub fn new(transport: Arc<T>, limits: Limits, cancel: CancellationToken) -> Self {
        Self {
            transport,
            entries: Arc::new(Mutex::new(HashMap::new())),
            limits,
            cancel,
            on_connect: None,
        }
    }

    /// Run `hook` for every connection this pool inserts.
    pub(crate) fn on_connect(mut self, hook: impl Fn(T::Conn) + Send + Sync + 'static) -> Self {
        self.on_connect = Some(Box::new(hook));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn contains(&self, destination: SocketAddr) -> bool {
        self.entries.lock().contains_key(&destination_key(destination))
    }

    /// Live pooled connection for `destination`, if any.
    pub fn get(&self, destination: SocketAddr) -> Option<T::Conn> {
        self.entries.lock().get(&destination_key(destination)).cloned()
    }

    /// Send `request` to `destination`, dialing if no connection is pooled.
    ///
    /// The request's destination is filled in when unset. A failed exchange
    /// leaves the pooled connection in place.
    ///
    /// # Errors
    /// A [`CallError`] carrying a synthesized `500` when the dial, the
    /// stream open, the write, or the response read fails.
    pub async fn call<X>(
        &self,
        destination: SocketAddr,
        mut request: Request<X>,
    ) -> std::result::Result<Response, CallError>
    where
        X: Send + Sync,
    {
        let key = destination_key(destination);
        request.destination.get_or_insert(destination);

        let conn = match self.connection(key).await {
            Ok(conn) => conn,
            Err(err) => {
                warn!(destination = %key, error = %err, "dial failed");
                return Err(CallError::new(err));
            }
        };
        exchange(&conn, &request, &self.limits, &self.cancel)
            .await
            .map_err(|err| {
                warn!(destination = %key, conn_id = conn.id(), route = %request.route, error = %err, "exchange failed");
                CallError::new(err)
            })
    }

    async fn connection(&self, key: SocketAddr) -> Result<T::Conn> {
        let pooled = self.entries.lock().get(&key).cloned();
        if let Some(conn) = pooled {
            return Ok(conn);
        }

        let dialed = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(TransportError::Cancelled.into()),
            dialed = tokio::time::timeout(self.limits.dial_timeout, self.transport.dial(key)) => {
                dialed.map_err(|_| TransportError::TimedOut)??
            }
        };
        counter!("quicnode_pool_dials_total").increment(1);

        let existing = {
            let mut entries = self.entries.lock();
            match entries.get(&key) {
                Some(existing) => Some(existing.clone()),
                None => {
                    entries.insert(key, dialed.clone());
                    None
                }
            }
        };
        if let Some(existing) = existing {
            debug!(destination = %key, "lost dial race, reusing pooled connection");
            dialed.close(0, "duplicate dial");
            return Ok(existing);
        }

        debug!(destination = %key, conn_id = dialed.id(), "pooled new connection");
        self.watch(key, dialed.clone());
        if let Some(hook) = &self.on_connect {
            hook(dialed.clone());
        }
        Ok(dialed)
    }

    fn watch(&self, key: SocketAddr, conn: T::Conn) {
        let entries = Arc::clone(&self.entries);
        tokio::spawn(async move {
            let reason = conn.closed().await;
            let evicted = {
                let mut entries = entries.lock();
                let same = entries
                    .get(&key)
                    .is_some_and(|pooled| pooled.id() == conn.id());
                if same {
                    entries.remove(&key);
                }
                same
            };
            if evicted {
                counter!("quicnode_pool_evictions_total").increment(1);
                debug!(destination = %key, conn_id = conn.id(), %reason, "evicted terminated connection");
            }
        });
    }

    /// Close every pooled connection. Entries leave the map as their
    /// watchers observe the termination.
    pub fn shutdown(&self) {
        let conns: Vec<T::Conn> = self.entries.lock().values().cloned().collect();
        for conn in conns {
            conn.close(0, "node shutdown (client)");
        }
    }
}

impl<T: Transport> fmt::Debug for ConnectionPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("connections", &self.len())
            .finish_non_exhaustive()
    }
}

/// Send `request` over a caller-supplied connection, bypassing the pool.
///
/// # Errors
/// [`Error::MissingConnection`] when no connection is given, otherwise the
/// same failures as [`ConnectionPool::call`], each with a synthesized `500`.
pub async fn call_on_connection<C, X>(
    conn: Option<&C>,
    request: &Request<X>,
    limits: &Limits,
    cancel: &CancellationToken,
) -> std::result::Result<Response, CallError>
where
    C: Connection,
    X: Sync,
{
    let conn = conn.ok_or_else(|| CallError::new(Error::MissingConnection))?;
    exchange(conn, request, limits, cancel)
        .await
        .map_err(CallError::new)
}

/// One request/response exchange on a new stream of `conn`.
///
/// The send side is finished after the request is written so the peer sees
/// a clean end of stream.
pub(crate) async fn exchange<C, X>(
    conn: &C,
    request: &Request<X>,
    limits: &Limits,
    cancel: &CancellationToken,
) -> Result<Response>
where
    C: Connection,
    X: Sync,
{
    let opened = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(TransportError::Cancelled.into()),
        opened = tokio::time::timeout(limits.stream_timeout, conn.open_stream()) => opened,
    };
    let (mut send, recv) = opened.map_err(|_| TransportError::TimedOut)??;

    let round_trip = async {
        codec::write_request(&mut send, request).await?;
        send.shutdown().await?;
        let mut reader = BufReader::new(recv);
        codec::read_response(&mut reader, &limits.frame).await
    };
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TransportError::Cancelled.into()),
        response = round_trip => response,
    }
}
