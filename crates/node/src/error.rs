//! Outbound call failures.

use corelib::{Error, Response};
use thiserror::Error;

/// A failed outbound call.
///
/// Calls never fail without a response: the synthesized
/// `500 Internal Server Error` travels with the underlying error so callers
/// can forward it as-is or inspect the cause.
#[derive(Debug, Error)]
#[error("call failed: {source}")]
pub struct CallError {
    response: Response,
    source: Error,
}

impl CallError {
    pub fn new(source: impl Into<Error>) -> Self {
        Self {
            response: Response::internal_error(),
            source: source.into(),
        }
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn error(&self) -> &Error {
        &self.source
    }

    pub fn into_response(self) -> Response {
        self.response
    }

    pub fn into_parts(self) -> (Response, Error) {
        (self.response, self.source)
    }

    pub fn is_timeout(&self) -> bool {
        self.source.is_timeout()
    }
}

impl From<Error> for CallError {
    fn from(source: Error) -> Self {
        Self::new(source)
    }
}
