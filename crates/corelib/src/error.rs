//! Error types for the core library.
//!
//! Two layers:
//! - [`TransportError`] is the structured error-kind enumeration every
//!   transport implementation reports. The classifier in
//!   [`crate::classify`] only ever looks at these kinds.
//! - [`Error`] is what codec, routing and call paths return.

use thiserror::Error;

/// Result type alias for the core library.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported by the transport layer.
///
/// Implementations map their native failures onto these kinds so that
/// retry/end-session/end-node decisions never depend on error text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The root cancellation signal fired while waiting.
    #[error("operation cancelled")]
    Cancelled,
    /// A dial, stream-open or handshake bound was exceeded.
    #[error("operation timed out")]
    TimedOut,
    /// The listening side of the transport is closed.
    #[error("listener closed")]
    Closed,
    /// Certificate or hostname validation failed.
    #[error("handshake failed: {0}")]
    Handshake(String),
    /// The connection was closed with an application error code.
    #[error("connection closed by application (code {code}): {reason}")]
    ApplicationClosed { code: u64, reason: String },
    /// Peer or local close, reset, or idle timeout.
    #[error("connection lost: {0}")]
    ConnectionLost(String),
    /// A condition the transport expects to clear on its own.
    #[error("transient transport error: {0}")]
    Transient(String),
    /// Anything else the transport could not classify.
    #[error("transport I/O error: {0}")]
    Io(String),
}

/// Errors that can occur while framing, routing or calling.
#[derive(Debug, Error)]
pub enum Error {
    /// The peer sent a frame that does not follow the wire format.
    #[error("malformed frame: {0}")]
    Parse(String),
    /// Reading or writing a stream failed, including short reads.
    #[error("stream I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A header block or declared body exceeded the configured limit.
    #[error("frame section of {len} bytes exceeds limit of {max}")]
    FrameTooLarge { len: usize, max: usize },
    /// The transport reported a failure.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Invalid listen address or missing required configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// A connection-bound call was made without a connection.
    #[error("connection handle is absent")]
    MissingConnection,
}

impl Error {
    pub(crate) fn parse(msg: impl Into<String>) -> Self {
        Error::Parse(msg.into())
    }

    /// True when the failure came from a bounded wait running out.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Transport(TransportError::TimedOut))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_converts() {
        let err: Error = TransportError::TimedOut.into();
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "operation timed out");
    }

    #[test]
    fn test_application_close_message() {
        let err = TransportError::ApplicationClosed {
            code: 0,
            reason: "node shutdown".into(),
        };
        assert_eq!(
            err.to_string(),
            "connection closed by application (code 0): node shutdown"
        );
    }
}
