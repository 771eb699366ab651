//! Input and transform blocks: `payload-input`, `json-extract`,
//! `memo-parser`.

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::{BlockContext, BlockError, BlockHandler, BlockOutput};

/// `payload-input` — expose the trigger payload (or one path of it) under an
/// alias for later blocks.
pub struct PayloadInput;

#[async_trait]
impl BlockHandler for PayloadInput {
    async fn execute(&self, ctx: &BlockContext<'_>) -> Result<BlockOutput, BlockError> {
        // `path` was already dereferenced by the engine when configured.
        let value = match ctx.config.get("path") {
            Some(resolved) => resolved.clone(),
            None => ctx.payload.clone(),
        };
        Ok(BlockOutput::value(value))
    }
}

/// `json-extract` — dotted-path extract bound under the node's alias.
pub struct JsonExtract;

#[async_trait]
impl BlockHandler for JsonExtract {
    async fn execute(&self, ctx: &BlockContext<'_>) -> Result<BlockOutput, BlockError> {
        let value = ctx
            .config
            .get("path")
            .cloned()
            .ok_or_else(|| BlockError::config("json-extract requires a 'path'"))?;
        Ok(BlockOutput::value(value))
    }
}

/// `memo-parser` — split a memo string into key/value pairs.
///
/// Each line of the memo is split on the first occurrence of the delimiter
/// (default `:`); lines without the delimiter are ignored.  The raw memo is
/// kept alongside the parsed pairs.
pub struct MemoParser;

#[async_trait]
impl BlockHandler for MemoParser {
    async fn execute(&self, ctx: &BlockContext<'_>) -> Result<BlockOutput, BlockError> {
        let memo = ctx
            .config
            .get("memoPath")
            .or_else(|| ctx.config.get("memo"))
            .and_then(Value::as_str)
            .ok_or_else(|| BlockError::config("memo-parser requires a memo string"))?;
        let delimiter = ctx.config_str("delimiter").unwrap_or(":");

        let mut pairs = Map::new();
        for line in memo.lines() {
            if let Some((key, value)) = line.split_once(delimiter) {
                pairs.insert(
                    key.trim().to_owned(),
                    Value::String(value.trim().to_owned()),
                );
            }
        }

        Ok(BlockOutput::value(json!({ "pairs": pairs, "raw": memo })))
    }
}
