//! Confidential-compute client.
//!
//! Workloads run remotely inside enclaves; submission returns an invocation
//! id that is polled to completion, and the attestation for a finished
//! invocation is fetched separately on a short timeout.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::http::{build_client, check_status, env_var_or, DEFAULT_HTTP_TIMEOUT};
use crate::ClientError;

/// Deadline for fetching an attestation once the workload completed.
pub const ATTESTATION_TIMEOUT: Duration = Duration::from_secs(10);

const INVOCATION_POLL_INTERVAL: Duration = Duration::from_secs(2);
const INVOCATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Result of a completed confidential workload.
#[derive(Debug, Clone)]
pub struct ComputeOutcome {
    pub result: Value,
    /// Opaque proof artifact, propagated into run results unchanged.
    pub attestation: Option<Value>,
}

#[async_trait]
pub trait ConfCompute: Send + Sync {
    /// Submit a workload, await completion, and return its outcome.
    async fn run_workload(
        &self,
        workload_id: &str,
        inputs: &Value,
    ) -> Result<ComputeOutcome, ClientError>;
}

#[derive(Debug, Clone)]
pub struct ComputeConfig {
    pub base_url: String,
    pub api_key: String,
}

impl ComputeConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: env_var_or("NILCC_BASE_URL", "http://127.0.0.1:40081"),
            api_key: env_var_or("NILCC_API_KEY", ""),
        }
    }
}

pub struct NilccClient {
    http: reqwest::Client,
    attestation_http: reqwest::Client,
    config: ComputeConfig,
}

impl NilccClient {
    pub fn new(config: ComputeConfig) -> Self {
        Self {
            http: build_client(DEFAULT_HTTP_TIMEOUT),
            attestation_http: build_client(ATTESTATION_TIMEOUT),
            config,
        }
    }

    async fn get_json(&self, client: &reqwest::Client, url: &str) -> Result<Value, ClientError> {
        let response = client
            .get(url)
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|e| ClientError::from_reqwest(e, DEFAULT_HTTP_TIMEOUT))?;
        check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::Protocol(e.to_string()))
    }
}

#[async_trait]
impl ConfCompute for NilccClient {
    async fn run_workload(
        &self,
        workload_id: &str,
        inputs: &Value,
    ) -> Result<ComputeOutcome, ClientError> {
        let url = format!(
            "{}/v1/workloads/{workload_id}/invocations",
            self.config.base_url
        );
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&json!({ "inputs": inputs }))
            .send()
            .await
            .map_err(|e| ClientError::from_reqwest(e, DEFAULT_HTTP_TIMEOUT))?;

        let body: Value = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::Protocol(e.to_string()))?;
        let invocation_id = body
            .get("invocationId")
            .and_then(Value::as_str)
            .ok_or_else(|| ClientError::Protocol("no invocationId in response".into()))?
            .to_owned();

        // Poll the invocation until the enclave reports a terminal state.
        let deadline = tokio::time::Instant::now() + INVOCATION_TIMEOUT;
        let status_url = format!("{}/v1/invocations/{invocation_id}", self.config.base_url);
        let result = loop {
            let status: Value = self.get_json(&self.http, &status_url).await?;
            match status.get("status").and_then(Value::as_str) {
                Some("completed") => {
                    break status.get("result").cloned().unwrap_or(Value::Null);
                }
                Some("failed") => {
                    return Err(ClientError::OperationFailed {
                        operation: invocation_id,
                        message: status
                            .get("error")
                            .and_then(Value::as_str)
                            .unwrap_or("workload failed")
                            .to_owned(),
                    });
                }
                _ => {
                    if tokio::time::Instant::now() >= deadline {
                        return Err(ClientError::OperationTimeout {
                            operation: invocation_id,
                            waited: INVOCATION_TIMEOUT,
                        });
                    }
                    tokio::time::sleep(INVOCATION_POLL_INTERVAL).await;
                }
            }
        };

        // Attestation fetch runs on its own short timeout; a missing
        // attestation is not a workload failure.
        let attestation_url = format!(
            "{}/v1/invocations/{invocation_id}/attestation",
            self.config.base_url
        );
        let attestation = match self.get_json(&self.attestation_http, &attestation_url).await {
            Ok(value) => Some(value),
            Err(ClientError::Http { status: 404, .. }) => None,
            Err(other) => return Err(other),
        };

        Ok(ComputeOutcome {
            result,
            attestation,
        })
    }
}
