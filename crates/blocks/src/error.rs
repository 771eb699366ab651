//! Block-level error type.

use thiserror::Error;

use clients::ClientError;

/// Classification the engine and queue act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockErrorKind {
    /// A required config value was missing or malformed.
    ConfigInvalid,
    /// Transient external failure; the queue may re-deliver the run.
    Transient,
    /// Permanent external failure; no retry.
    Permanent,
    /// The external service rejected our credentials.
    Unauthenticated,
}

/// Structured failure returned by a handler's `execute`.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct BlockError {
    pub kind: BlockErrorKind,
    pub message: String,
}

impl BlockError {
    pub fn config(message: impl Into<String>) -> Self {
        Self {
            kind: BlockErrorKind::ConfigInvalid,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: BlockErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: BlockErrorKind::Permanent,
            message: message.into(),
        }
    }

    pub fn retryable(&self) -> bool {
        self.kind == BlockErrorKind::Transient
    }
}

impl From<ClientError> for BlockError {
    fn from(err: ClientError) -> Self {
        let kind = if err.is_unauthenticated() {
            BlockErrorKind::Unauthenticated
        } else if err.retryable() {
            BlockErrorKind::Transient
        } else {
            BlockErrorKind::Permanent
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}
