//! The `BlockHandler` trait — the contract every block must fulfil.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::BlockError;

/// Everything a handler may see for one node execution.
///
/// `config` arrives with path-valued keys already dereferenced by the
/// engine; handlers read plain values out of it.  Handlers borrow memory
/// read-only and return their own output — they never mutate engine state.
#[derive(Debug)]
pub struct BlockContext<'a> {
    pub run_id: uuid::Uuid,
    pub node_id: &'a str,
    /// Resolved block configuration.
    pub config: &'a Value,
    /// Trigger payload the run started from.
    pub payload: &'a Value,
    /// Outputs of every earlier block, keyed by alias or node id.
    pub memory: &'a Map<String, Value>,
    /// Incoming edge outputs keyed by handle (branching/multi-input blocks).
    pub inputs: &'a HashMap<String, Value>,
    /// Decrypted connector configuration, when the node has one bound.
    pub connector: Option<&'a Value>,
}

impl BlockContext<'_> {
    /// String config value under `key`, if present.
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(Value::as_str)
    }

    /// Required string config value under `key`.
    pub fn require_str(&self, key: &str) -> Result<&str, BlockError> {
        self.config_str(key)
            .ok_or_else(|| BlockError::config(format!("missing required config '{key}'")))
    }
}

/// What a handler produced for one node.
#[derive(Debug, Default)]
pub struct BlockOutput {
    /// The value bound into memory under the node's alias.
    pub value: Value,
    /// Opaque proof artifact propagated into the run result unchanged.
    pub attestation: Option<Value>,
    /// Run-level fields merged into the final result (e.g. `stateKey`).
    pub globals: Map<String, Value>,
    /// Outgoing handle selected by a branching block.
    pub selected_handle: Option<String>,
}

impl BlockOutput {
    pub fn value(value: Value) -> Self {
        Self {
            value,
            ..Self::default()
        }
    }

    pub fn with_attestation(mut self, attestation: Option<Value>) -> Self {
        self.attestation = attestation;
        self
    }

    pub fn with_global(mut self, key: &str, value: Value) -> Self {
        self.globals.insert(key.to_owned(), value);
        self
    }

    pub fn with_selected_handle(mut self, handle: impl Into<String>) -> Self {
        self.selected_handle = Some(handle.into());
        self
    }
}

/// The core block trait.  All built-in handlers implement this; the engine
/// dispatches through trait objects held by the registry.
#[async_trait]
pub trait BlockHandler: Send + Sync {
    async fn execute(&self, ctx: &BlockContext<'_>) -> Result<BlockOutput, BlockError>;
}
