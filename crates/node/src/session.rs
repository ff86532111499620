//! Per-connection session tasks.
//!
//! An inbound session waits for the handshake, joins the node's open set,
//! then accepts streams until the connection ends or the node shuts down.
//! Pooled outbound connections run the same stream loop so a peer can call
//! back over the connection it was dialed on.

use crate::node::Shared;
use crate::stream::serve_stream;
use crate::transport::{Connection, Pending, Transport};
use corelib::classify_stream;
use metrics::counter;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Close reason sent when a stream-accept failure ends a session.
pub(crate) const SESSION_ENDED: &str = "session ended";

/// Close reason sent on inbound connections when the node shuts down.
pub(crate) const SERVER_SHUTDOWN: &str = "node shutdown (server)";

/// Why a stream loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoopExit {
    /// The node's root token fired; the connection is still open.
    Cancelled,
    /// The connection terminated or was closed by the loop.
    Ended,
}

/// Drive an inbound connection attempt to completion.
pub(crate) async fn run_inbound<T: Transport>(shared: Arc<Shared<T>>, pending: T::Pending) {
    let remote = pending.remote_addr();
    let conn = tokio::select! {
        biased;
        _ = shared.cancel.cancelled() => {
            debug!(%remote, "abandoning handshake: node shutting down");
            return;
        }
        completed = pending.complete() => match completed {
            Ok(conn) => conn,
            Err(err) => {
                debug!(%remote, error = %err, "connection ended before handshake completed");
                return;
            }
        },
    };

    let id = conn.id();
    shared.open.insert(id, conn.clone());
    if shared.cancel.is_cancelled() {
        // Shutdown may already have swept the open set.
        shared.open.remove(&id);
        conn.close(0, SERVER_SHUTDOWN);
        return;
    }
    counter!("quicnode_connections_accepted_total").increment(1);
    info!(conn_id = id, %remote, "session established");

    if serve_streams(&shared, &conn).await == LoopExit::Cancelled {
        conn.close(0, SERVER_SHUTDOWN);
    }

    shared.open.remove(&id);
    info!(conn_id = id, %remote, "session ended");
}

/// Accept streams on `conn` until it terminates or the node is cancelled.
///
/// Transient accept failures pause for the stream backoff. Any other
/// failure ends the loop and closes the connection. On cancellation the
/// connection is left open for the caller to close.
pub(crate) async fn serve_streams<T: Transport>(
    shared: &Arc<Shared<T>>,
    conn: &T::Conn,
) -> LoopExit {
    let terminated = conn.closed();
    tokio::pin!(terminated);

    loop {
        let accepted = tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => return LoopExit::Cancelled,
            reason = &mut terminated => {
                debug!(conn_id = conn.id(), %reason, "connection terminated");
                return LoopExit::Ended;
            }
            accepted = conn.accept_stream() => accepted,
        };

        match accepted {
            Ok((send, recv)) => {
                let shared = shared.clone();
                let conn = conn.clone();
                tokio::spawn(async move {
                    serve_stream(&shared, conn, send, recv).await;
                });
            }
            Err(err) => {
                let outcome = classify_stream(&err);
                if outcome.is_terminal() {
                    debug!(conn_id = conn.id(), ?outcome, error = %err, "stream loop ending");
                    conn.close(0, SESSION_ENDED);
                    return LoopExit::Ended;
                }
                warn!(conn_id = conn.id(), error = %err, "transient stream accept failure");
                tokio::select! {
                    _ = shared.cancel.cancelled() => return LoopExit::Cancelled,
                    _ = tokio::time::sleep(shared.limits.stream_backoff) => {}
                }
            }
        }
    }
}
