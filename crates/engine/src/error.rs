//! Engine-level error types.
//!
//! Every failure that can end a run maps onto a stable [`ErrorKind`]; the
//! queue decides re-delivery from `retryable()` and the run record carries
//! the kind string.

use thiserror::Error;

use blocks::{BlockError, BlockErrorKind};
use store::models::RunError;
use store::StoreError;

/// Stable error classification carried on run records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    GraphInvalid,
    GraphMissing,
    UnknownBlock,
    InsufficientCredits,
    CreditExhausted,
    ConfigInvalid,
    HandlerTransient,
    HandlerPermanent,
    ExternalUnauthenticated,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GraphInvalid => "graph_invalid",
            Self::GraphMissing => "graph_missing",
            Self::UnknownBlock => "unknown_block",
            Self::InsufficientCredits => "insufficient_credits",
            Self::CreditExhausted => "credit_exhausted",
            Self::ConfigInvalid => "config_invalid",
            Self::HandlerTransient => "handler_transient",
            Self::HandlerPermanent => "handler_permanent",
            Self::ExternalUnauthenticated => "external_unauthenticated",
        }
    }

    /// Only transient handler failures are worth re-delivering.
    pub fn retryable(self) -> bool {
        matches!(self, Self::HandlerTransient)
    }
}

/// Errors produced by the workflow engine (validation + execution).
#[derive(Debug, Error)]
pub enum EngineError {
    /// The workflow has no graph, or the graph has no nodes.
    #[error("workflow has no executable graph")]
    GraphMissing,

    /// The graph failed structural validation.
    #[error("invalid graph: {0}")]
    GraphInvalid(String),

    /// No handler is registered for the node's catalog key.
    #[error("node '{node_id}': unknown block '{block_id}'")]
    UnknownBlock { node_id: String, block_id: String },

    /// The pre-flight credit check failed; nothing was debited.
    #[error("insufficient credits: need {needed}, balance {balance}")]
    InsufficientCredits { needed: i64, balance: i64 },

    /// A mid-run debit failed.
    #[error("node '{node_id}': credits exhausted")]
    CreditExhausted { node_id: String },

    /// A required path failed to resolve against payload/memory.
    #[error("node '{node_id}': {message}")]
    ConfigInvalid { node_id: String, message: String },

    /// A handler reported failure.
    #[error("node '{node_id}': {message}")]
    Handler {
        node_id: String,
        kind: ErrorKind,
        message: String,
    },

    /// Persistence failure underneath the engine.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Wrap a handler failure, preserving its classification.
    pub fn from_block_error(node_id: &str, err: BlockError) -> Self {
        match err.kind {
            BlockErrorKind::ConfigInvalid => Self::ConfigInvalid {
                node_id: node_id.to_owned(),
                message: err.message,
            },
            BlockErrorKind::Transient => Self::Handler {
                node_id: node_id.to_owned(),
                kind: ErrorKind::HandlerTransient,
                message: err.message,
            },
            BlockErrorKind::Permanent => Self::Handler {
                node_id: node_id.to_owned(),
                kind: ErrorKind::HandlerPermanent,
                message: err.message,
            },
            BlockErrorKind::Unauthenticated => Self::Handler {
                node_id: node_id.to_owned(),
                kind: ErrorKind::ExternalUnauthenticated,
                message: err.message,
            },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::GraphMissing => ErrorKind::GraphMissing,
            Self::GraphInvalid(_) => ErrorKind::GraphInvalid,
            Self::UnknownBlock { .. } => ErrorKind::UnknownBlock,
            Self::InsufficientCredits { .. } => ErrorKind::InsufficientCredits,
            Self::CreditExhausted { .. } => ErrorKind::CreditExhausted,
            Self::ConfigInvalid { .. } => ErrorKind::ConfigInvalid,
            Self::Handler { kind, .. } => *kind,
            // Infra failures re-deliver like transient handler errors.
            Self::Store(_) => ErrorKind::HandlerTransient,
        }
    }

    pub fn retryable(&self) -> bool {
        match self {
            Self::Store(StoreError::NotFound)
            | Self::Store(StoreError::InsufficientCredits { .. }) => false,
            Self::Store(_) => true,
            other => other.kind().retryable(),
        }
    }

    pub fn node_id(&self) -> Option<&str> {
        match self {
            Self::UnknownBlock { node_id, .. }
            | Self::CreditExhausted { node_id }
            | Self::ConfigInvalid { node_id, .. }
            | Self::Handler { node_id, .. } => Some(node_id),
            _ => None,
        }
    }

    /// The structured error persisted on a failed run.
    pub fn to_run_error(&self) -> RunError {
        RunError {
            kind: self.kind().as_str().to_owned(),
            message: self.to_string(),
            node_id: self.node_id().map(str::to_owned),
            retryable: self.retryable(),
        }
    }
}
