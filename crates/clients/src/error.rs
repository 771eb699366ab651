//! Client-level error type with retry classification.

use std::time::Duration;

use thiserror::Error;

/// Errors returned by external-service clients.
///
/// The engine maps these onto run-level error kinds; `retryable` decides
/// whether the queue re-delivers the whole run.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request did not complete within the configured timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Connection-level failure (reset, refused, DNS).
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-success HTTP status from the service.
    #[error("http {status}: {message}")]
    Http { status: u16, message: String },

    /// The service rejected our credentials.
    #[error("authentication rejected: {0}")]
    Unauthenticated(String),

    /// The service answered with something we could not interpret.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// An asynchronous remote operation reported failure.
    #[error("operation {operation} failed: {message}")]
    OperationFailed { operation: String, message: String },

    /// An asynchronous remote operation did not complete in time.
    #[error("operation {operation} still incomplete after {waited:?}")]
    OperationTimeout { operation: String, waited: Duration },
}

impl ClientError {
    /// Whether the queue should re-deliver the run after this failure.
    pub fn retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Transport(_) | Self::OperationTimeout { .. } => true,
            Self::Http { status, .. } => *status == 408 || *status == 429 || *status >= 500,
            Self::Unauthenticated(_)
            | Self::Protocol(_)
            | Self::OperationFailed { .. } => false,
        }
    }

    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, Self::Unauthenticated(_))
    }

    pub(crate) fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout)
        } else {
            Self::Transport(err.to_string())
        }
    }
}
