//! Inbound stream handling: one request in, one response out.

use crate::node::Shared;
use crate::transport::{Connection, Transport};
use corelib::{codec, Error, Response};
use metrics::counter;
use tokio::io::{AsyncWriteExt, BufReader};
use tracing::{debug, warn};

type SendHalf<T> = <<T as Transport>::Conn as Connection>::SendStream;
type RecvHalf<T> = <<T as Transport>::Conn as Connection>::RecvStream;

/// Decode one request, dispatch it, and write the response.
///
/// A request that fails to decode is answered with `400 Bad Request`
/// carrying the parse error text. The connection stays up either way.
pub(crate) async fn serve_stream<T: Transport>(
    shared: &Shared<T>,
    conn: T::Conn,
    mut send: SendHalf<T>,
    recv: RecvHalf<T>,
) {
    counter!("quicnode_streams_total").increment(1);
    let remote = conn.remote_addr();
    let mut reader = BufReader::new(recv);

    let response =
        match codec::read_request::<_, T::Conn>(&mut reader, &shared.limits.frame).await {
            Ok(mut request) => {
                debug!(%remote, route = %request.route, "dispatching request");
                request.source = Some(remote);
                request.connection = Some(conn);
                shared.router.dispatch(request).await
            }
            Err(err) => {
                counter!("quicnode_bad_requests_total").increment(1);
                warn!(%remote, error = %err, "rejecting malformed request");
                Response::bad_request(err.to_string())
            }
        };

    match codec::write_response(&mut send, &response).await {
        Ok(()) => {}
        Err(Error::Parse(reason)) => {
            warn!(%remote, %reason, "handler produced an unframeable response");
            if let Err(err) = codec::write_response(&mut send, &Response::internal_error()).await {
                debug!(%remote, error = %err, "failed to write fallback response");
                return;
            }
        }
        Err(err) => {
            debug!(%remote, error = %err, "failed to write response");
            return;
        }
    }
    if let Err(err) = send.shutdown().await {
        debug!(%remote, error = %err, "failed to finish stream");
    }
}
