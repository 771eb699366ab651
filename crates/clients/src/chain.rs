//! Chain RPC client — shielded sends and received-transaction listing
//! against a privacy-oriented chain node's JSON-RPC wallet interface.
//!
//! Shielded sends are asynchronous on the node: `shielded_send` returns an
//! operation id which must be polled to completion.  [`await_operation`]
//! does that with a 5s poll cadence up to a configured deadline.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::http::{build_client, check_status, env_var, env_var_or};
use crate::ClientError;

/// Poll cadence while waiting for an asynchronous chain operation.
pub const OPERATION_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default deadline for asynchronous chain operations.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(120);

/// A transaction received at a shielded address.
#[derive(Debug, Clone, Deserialize)]
pub struct ReceivedTransaction {
    pub txid: String,
    pub amount: f64,
    /// Memo field as hex, exactly as the node reports it.
    #[serde(default)]
    pub memo: Option<String>,
    #[serde(default)]
    pub confirmations: u32,
    #[serde(default)]
    pub blockheight: Option<u64>,
}

/// Parameters for a shielded send.
#[derive(Debug, Clone, Serialize)]
pub struct ShieldedSend {
    /// Source address; `None` uses the node operator's configured default.
    pub from: Option<String>,
    pub to: String,
    pub amount: f64,
    /// UTF-8 memo, hex-encoded on the wire.
    pub memo: Option<String>,
    pub privacy_policy: Option<String>,
}

/// Status of an asynchronous chain operation.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationStatus {
    Queued,
    Executing,
    Success { txid: String },
    Failed { message: String },
}

/// Narrow chain interface the engine and supervisors depend on.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Transactions received at `address` with at least `min_confirmations`.
    async fn received_by_address(
        &self,
        address: &str,
        min_confirmations: u32,
    ) -> Result<Vec<ReceivedTransaction>, ClientError>;

    /// Start a shielded send; returns the node's operation id.
    async fn shielded_send(&self, send: &ShieldedSend) -> Result<String, ClientError>;

    async fn operation_status(&self, operation_id: &str) -> Result<OperationStatus, ClientError>;

    /// Default source address configured on the client, if any.
    fn default_from_address(&self) -> Option<&str> {
        None
    }

    /// Deadline for [`await_operation`].
    fn operation_timeout(&self) -> Duration {
        DEFAULT_OPERATION_TIMEOUT
    }
}

/// Poll an operation every [`OPERATION_POLL_INTERVAL`] until it reaches a
/// terminal status or the client's deadline passes.  Returns the txid.
pub async fn await_operation(
    chain: &dyn ChainRpc,
    operation_id: &str,
) -> Result<String, ClientError> {
    let deadline = tokio::time::Instant::now() + chain.operation_timeout();

    loop {
        match chain.operation_status(operation_id).await? {
            OperationStatus::Success { txid } => return Ok(txid),
            OperationStatus::Failed { message } => {
                return Err(ClientError::OperationFailed {
                    operation: operation_id.to_owned(),
                    message,
                })
            }
            OperationStatus::Queued | OperationStatus::Executing => {
                if tokio::time::Instant::now() >= deadline {
                    return Err(ClientError::OperationTimeout {
                        operation: operation_id.to_owned(),
                        waited: chain.operation_timeout(),
                    });
                }
                tokio::time::sleep(OPERATION_POLL_INTERVAL).await;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// JSON-RPC implementation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ZcashConfig {
    pub url: String,
    pub user: String,
    pub password: String,
    pub default_from_address: Option<String>,
    pub default_privacy_policy: String,
    pub operation_timeout: Duration,
}

impl ZcashConfig {
    pub fn from_env() -> Self {
        let operation_timeout = env_var("ZCASH_OPERATION_TIMEOUT_MS")
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_OPERATION_TIMEOUT);

        Self {
            url: env_var_or("ZCASH_RPC_URL", "http://127.0.0.1:8232"),
            user: env_var_or("ZCASH_RPC_USER", ""),
            password: env_var_or("ZCASH_RPC_PASSWORD", ""),
            default_from_address: env_var("ZCASH_DEFAULT_FROM_ADDRESS"),
            default_privacy_policy: env_var_or("ZCASH_DEFAULT_PRIVACY_POLICY", "AllowRevealedAmounts"),
            operation_timeout,
        }
    }
}

/// JSON-RPC client for the node's wallet interface.
pub struct ZcashRpcClient {
    http: reqwest::Client,
    config: ZcashConfig,
}

impl ZcashRpcClient {
    pub fn new(config: ZcashConfig) -> Self {
        Self {
            http: build_client(Duration::from_secs(30)),
            config,
        }
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, ClientError> {
        debug!(method, "chain rpc call");
        let response = self
            .http
            .post(&self.config.url)
            .basic_auth(&self.config.user, Some(&self.config.password))
            .json(&json!({
                "jsonrpc": "1.0",
                "id": "shieldflow",
                "method": method,
                "params": params,
            }))
            .send()
            .await
            .map_err(|e| ClientError::from_reqwest(e, Duration::from_secs(30)))?;

        let body: Value = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::Protocol(e.to_string()))?;

        if let Some(err) = body.get("error").filter(|e| !e.is_null()) {
            return Err(ClientError::Protocol(format!("rpc error: {err}")));
        }
        Ok(body.get("result").cloned().unwrap_or(Value::Null))
    }
}

#[async_trait]
impl ChainRpc for ZcashRpcClient {
    async fn received_by_address(
        &self,
        address: &str,
        min_confirmations: u32,
    ) -> Result<Vec<ReceivedTransaction>, ClientError> {
        let result = self
            .call("z_listreceivedbyaddress", json!([address, min_confirmations]))
            .await?;
        serde_json::from_value(result).map_err(|e| ClientError::Protocol(e.to_string()))
    }

    async fn shielded_send(&self, send: &ShieldedSend) -> Result<String, ClientError> {
        let from = send
            .from
            .as_deref()
            .or(self.config.default_from_address.as_deref())
            .ok_or_else(|| ClientError::Protocol("no source address configured".into()))?;

        let mut recipient = json!({ "address": send.to, "amount": send.amount });
        if let Some(memo) = &send.memo {
            recipient["memo"] = json!(hex::encode(memo.as_bytes()));
        }

        let policy = send
            .privacy_policy
            .as_deref()
            .unwrap_or(&self.config.default_privacy_policy);

        let result = self
            .call("z_sendmany", json!([from, [recipient], 1, null, policy]))
            .await?;
        result
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| ClientError::Protocol("z_sendmany returned no operation id".into()))
    }

    async fn operation_status(&self, operation_id: &str) -> Result<OperationStatus, ClientError> {
        let result = self
            .call("z_getoperationstatus", json!([[operation_id]]))
            .await?;
        let op = result
            .as_array()
            .and_then(|a| a.first())
            .ok_or_else(|| ClientError::Protocol("unknown operation id".into()))?;

        match op.get("status").and_then(Value::as_str) {
            Some("queued") => Ok(OperationStatus::Queued),
            Some("executing") => Ok(OperationStatus::Executing),
            Some("success") => {
                let txid = op
                    .pointer("/result/txid")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_owned();
                Ok(OperationStatus::Success { txid })
            }
            Some("failed") => Ok(OperationStatus::Failed {
                message: op
                    .pointer("/error/message")
                    .and_then(Value::as_str)
                    .unwrap_or("operation failed")
                    .to_owned(),
            }),
            other => Err(ClientError::Protocol(format!(
                "unexpected operation status: {other:?}"
            ))),
        }
    }

    fn default_from_address(&self) -> Option<&str> {
        self.config.default_from_address.as_deref()
    }

    fn operation_timeout(&self) -> Duration {
        self.config.operation_timeout
    }
}
