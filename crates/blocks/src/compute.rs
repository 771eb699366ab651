//! Confidential-compute blocks: `nillion-compute`, `nillion-block-graph`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use clients::ConfCompute;

use crate::{BlockContext, BlockError, BlockHandler, BlockOutput};

/// Shared handler for both confidential workload kinds; they differ only in
/// the config key naming the workload.
pub struct ComputeWorkload {
    compute: Arc<dyn ConfCompute>,
    workload_key: &'static str,
}

impl ComputeWorkload {
    /// `nillion-compute` handler.
    pub fn compute(compute: Arc<dyn ConfCompute>) -> Self {
        Self {
            compute,
            workload_key: "workloadId",
        }
    }

    /// `nillion-block-graph` handler.
    pub fn block_graph(compute: Arc<dyn ConfCompute>) -> Self {
        Self {
            compute,
            workload_key: "graphId",
        }
    }
}

#[async_trait]
impl BlockHandler for ComputeWorkload {
    async fn execute(&self, ctx: &BlockContext<'_>) -> Result<BlockOutput, BlockError> {
        let workload_id = ctx
            .config_str(self.workload_key)
            .or_else(|| ctx.config_str("workloadId"))
            .ok_or_else(|| {
                BlockError::config(format!("missing required config '{}'", self.workload_key))
            })?;

        let inputs = ctx
            .config
            .get("inputsPath")
            .or_else(|| ctx.config.get("inputs"))
            .cloned()
            .unwrap_or_else(|| ctx.payload.clone());

        let outcome = self.compute.run_workload(workload_id, &inputs).await?;

        Ok(BlockOutput::value(outcome.result).with_attestation(outcome.attestation))
    }
}
