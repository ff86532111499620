//! Failure classification for the accept and stream loops.
//!
//! Both loops hand every transport error to a classifier and act on the
//! outcome instead of inspecting the error themselves:
//!
//! | Loop   | Outcome            | Terminal | Action                          |
//! |--------|--------------------|----------|---------------------------------|
//! | accept | `Cancelled`        | yes      | exit                            |
//! | accept | `Closed`           | yes      | exit                            |
//! | accept | `Transient`        | no       | back off ~1 s, accept again     |
//! | accept | `Fatal`            | yes      | exit, schedule node shutdown    |
//! | stream | `Cancelled`        | yes      | end session                     |
//! | stream | `Handshake`        | yes      | end session                     |
//! | stream | `ApplicationClosed`| yes      | end session                     |
//! | stream | `ConnectionLost`   | yes      | end session                     |
//! | stream | `Transient`        | no       | back off ~25 ms, accept again   |
//! | stream | `Unrecognized`     | yes      | end session (fail closed)       |

use crate::error::TransportError;
use std::time::Duration;

/// Pause before accepting again after a transient accept failure.
pub const ACCEPT_BACKOFF: Duration = Duration::from_secs(1);

/// Pause before accepting another stream after a transient failure.
pub const STREAM_BACKOFF: Duration = Duration::from_millis(25);

/// What the accept loop should do with an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptOutcome {
    /// Root signal fired; normal exit.
    Cancelled,
    /// Listener was closed; normal exit.
    Closed,
    /// Retry after [`ACCEPT_BACKOFF`].
    Transient,
    /// Exit and tear the node down asynchronously.
    Fatal,
}

impl AcceptOutcome {
    pub fn is_terminal(self) -> bool {
        !matches!(self, AcceptOutcome::Transient)
    }

    /// True only for the outcome that must take the whole node down.
    pub fn requires_shutdown(self) -> bool {
        matches!(self, AcceptOutcome::Fatal)
    }
}

/// What a session's stream loop should do with an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// Root signal fired or a deadline passed.
    Cancelled,
    /// Certificate or hostname validation failed.
    Handshake,
    /// Peer or local application closed the connection.
    ApplicationClosed,
    /// Connection is gone: reset, idle timeout, or transport close.
    ConnectionLost,
    /// Retry after [`STREAM_BACKOFF`].
    Transient,
    /// Anything else. Treated as terminal.
    Unrecognized,
}

impl StreamOutcome {
    pub fn is_terminal(self) -> bool {
        !matches!(self, StreamOutcome::Transient)
    }
}

/// Classify an error surfaced by `listener.accept`.
pub fn classify_accept(err: &TransportError) -> AcceptOutcome {
    match err {
        TransportError::Cancelled => AcceptOutcome::Cancelled,
        TransportError::Closed => AcceptOutcome::Closed,
        TransportError::Transient(_) => AcceptOutcome::Transient,
        _ => AcceptOutcome::Fatal,
    }
}

/// Classify an error surfaced by `connection.accept_stream`.
pub fn classify_stream(err: &TransportError) -> StreamOutcome {
    match err {
        TransportError::Cancelled | TransportError::TimedOut => StreamOutcome::Cancelled,
        TransportError::Handshake(_) => StreamOutcome::Handshake,
        TransportError::ApplicationClosed { .. } => StreamOutcome::ApplicationClosed,
        TransportError::ConnectionLost(_) | TransportError::Closed => {
            StreamOutcome::ConnectionLost
        }
        TransportError::Transient(_) => StreamOutcome::Transient,
        TransportError::Io(_) => StreamOutcome::Unrecognized,
    }
}
