//! Storage blocks: `state-store`, `state-read`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use clients::StorageVault;

use crate::{BlockContext, BlockError, BlockHandler, BlockOutput};

const DEFAULT_COLLECTION: &str = "state";

fn record_key(ctx: &BlockContext<'_>) -> Result<String, BlockError> {
    let key = ctx
        .config
        .get("keyPath")
        .or_else(|| ctx.config.get("key"))
        .ok_or_else(|| BlockError::config("a record key is required"))?;
    match key {
        Value::String(s) => Ok(s.clone()),
        other => Ok(other.to_string()),
    }
}

/// `state-store` — write an encrypted record; output is the opaque
/// `stateKey` reference, also surfaced as a run-level global.
pub struct StateStore {
    vault: Arc<dyn StorageVault>,
}

impl StateStore {
    pub fn new(vault: Arc<dyn StorageVault>) -> Self {
        Self { vault }
    }
}

#[async_trait]
impl BlockHandler for StateStore {
    async fn execute(&self, ctx: &BlockContext<'_>) -> Result<BlockOutput, BlockError> {
        let collection = ctx.config_str("collection").unwrap_or(DEFAULT_COLLECTION);
        let key = record_key(ctx)?;
        let value = ctx
            .config
            .get("valuePath")
            .or_else(|| ctx.config.get("value"))
            .cloned()
            .unwrap_or_else(|| ctx.payload.clone());

        let state_key = self.vault.store_record(collection, &key, &value).await?;

        Ok(
            BlockOutput::value(json!({ "stateKey": state_key, "key": key }))
                .with_global("stateKey", Value::String(state_key)),
        )
    }
}

/// `state-read` — read a record back; absent keys yield `null` rather than
/// failing the run.
pub struct StateRead {
    vault: Arc<dyn StorageVault>,
}

impl StateRead {
    pub fn new(vault: Arc<dyn StorageVault>) -> Self {
        Self { vault }
    }
}

#[async_trait]
impl BlockHandler for StateRead {
    async fn execute(&self, ctx: &BlockContext<'_>) -> Result<BlockOutput, BlockError> {
        let collection = ctx.config_str("collection").unwrap_or(DEFAULT_COLLECTION);
        let key = record_key(ctx)?;

        let value = self.vault.read_record(collection, &key).await?;
        Ok(BlockOutput::value(value.unwrap_or(Value::Null)))
    }
}
