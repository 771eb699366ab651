//! Chain block: `zcash-send`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use clients::{chain, ChainRpc, ShieldedSend};

use crate::{BlockContext, BlockError, BlockHandler, BlockOutput};

/// `zcash-send` — resolve recipient, amount, memo and privacy policy, start
/// a shielded send, and block until the node reports the operation
/// complete.
///
/// The chain RPC accepts no idempotency token, so a worker retry of a run
/// that already broadcast can double-send.  Every send carries a
/// deterministic reconciliation label (`run_id:node_id`) in its output so
/// operators can audit duplicates; operators that cannot tolerate the
/// exposure should cap attempts at 1 for workflows containing this block.
pub struct ZcashSendHandler {
    chain: Arc<dyn ChainRpc>,
}

impl ZcashSendHandler {
    pub fn new(chain: Arc<dyn ChainRpc>) -> Self {
        Self { chain }
    }
}

fn amount_from(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[async_trait]
impl BlockHandler for ZcashSendHandler {
    async fn execute(&self, ctx: &BlockContext<'_>) -> Result<BlockOutput, BlockError> {
        let to = ctx
            .config
            .get("toPath")
            .or_else(|| ctx.config.get("to"))
            .and_then(Value::as_str)
            .or_else(|| ctx.config_str("fallbackAddress"))
            .ok_or_else(|| BlockError::config("no recipient address configured"))?
            .to_owned();

        let amount = ctx
            .config
            .get("amountPath")
            .or_else(|| ctx.config.get("amount"))
            .and_then(amount_from)
            .ok_or_else(|| BlockError::config("no sendable amount configured"))?;

        let memo = ctx
            .config
            .get("memoPath")
            .or_else(|| ctx.config.get("memo"))
            .and_then(Value::as_str)
            .map(str::to_owned);

        let send = ShieldedSend {
            from: ctx.config_str("from").map(str::to_owned),
            to: to.clone(),
            amount,
            memo,
            privacy_policy: ctx.config_str("privacyPolicy").map(str::to_owned),
        };

        let reconciliation = format!("{}:{}", ctx.run_id, ctx.node_id);
        info!(to = %send.to, amount, %reconciliation, "starting shielded send");

        let operation_id = self.chain.shielded_send(&send).await?;
        let txid = chain::await_operation(self.chain.as_ref(), &operation_id).await?;

        Ok(BlockOutput::value(json!({
            "txid": txid,
            "operationId": operation_id,
            "to": to,
            "amount": amount,
            "reconciliation": reconciliation,
        }))
        .with_global("shielded", Value::Bool(true)))
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use clients::{ClientError, OperationStatus, ReceivedTransaction};
    use serde_json::Map;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Chain double that completes every operation immediately.
    struct InstantChain {
        sends: Mutex<Vec<ShieldedSend>>,
    }

    #[async_trait]
    impl ChainRpc for InstantChain {
        async fn received_by_address(
            &self,
            _address: &str,
            _min_confirmations: u32,
        ) -> Result<Vec<ReceivedTransaction>, ClientError> {
            Ok(Vec::new())
        }

        async fn shielded_send(&self, send: &ShieldedSend) -> Result<String, ClientError> {
            self.sends.lock().unwrap().push(send.clone());
            Ok("opid-1".to_owned())
        }

        async fn operation_status(
            &self,
            _operation_id: &str,
        ) -> Result<OperationStatus, ClientError> {
            Ok(OperationStatus::Success {
                txid: "tx-1".to_owned(),
            })
        }
    }

    #[tokio::test]
    async fn resolves_amount_and_falls_back_to_configured_address() {
        let chain = Arc::new(InstantChain {
            sends: Mutex::new(Vec::new()),
        });
        let handler = ZcashSendHandler::new(chain.clone());

        // `amountPath` arrives already dereferenced by the engine.
        let config = json!({ "amountPath": "1.5", "fallbackAddress": "zs1xtest" });
        let payload = json!({});
        let memory = Map::new();
        let inputs = HashMap::new();

        let ctx = BlockContext {
            run_id: uuid::Uuid::new_v4(),
            node_id: "send",
            config: &config,
            payload: &payload,
            memory: &memory,
            inputs: &inputs,
            connector: None,
        };

        let out = handler.execute(&ctx).await.unwrap();
        assert_eq!(out.value["txid"], "tx-1");
        assert_eq!(out.globals.get("shielded"), Some(&json!(true)));

        let sends = chain.sends.lock().unwrap();
        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0].to, "zs1xtest");
        assert_eq!(sends[0].amount, 1.5);
    }
}
