//! LLM gateway client.
//!
//! The gateway runs models inside attested enclaves; besides the text
//! completion it can return a response signature, the verifying key, and an
//! attestation document, all of which are propagated unchanged.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::http::{build_client, check_status, env_var_or};
use crate::ClientError;

/// LLM calls get a longer deadline than generic HTTP.
pub const LLM_TIMEOUT: Duration = Duration::from_secs(60);

const DEFAULT_MODEL: &str = "meta-llama/Llama-3.1-8B-Instruct";

/// A completed LLM call.
#[derive(Debug, Clone)]
pub struct LlmReply {
    pub text: String,
    pub signature: Option<String>,
    pub verifying_key: Option<String>,
    pub attestation: Option<Value>,
}

#[async_trait]
pub trait LlmGateway: Send + Sync {
    async fn complete(&self, model: Option<&str>, prompt: &str) -> Result<LlmReply, ClientError>;
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: String,
}

impl LlmConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: env_var_or("NILAI_BASE_URL", "http://127.0.0.1:40082"),
            api_key: env_var_or("NILAI_API_KEY", ""),
        }
    }
}

pub struct NilaiClient {
    http: reqwest::Client,
    config: LlmConfig,
}

impl NilaiClient {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            http: build_client(LLM_TIMEOUT),
            config,
        }
    }
}

#[async_trait]
impl LlmGateway for NilaiClient {
    async fn complete(&self, model: Option<&str>, prompt: &str) -> Result<LlmReply, ClientError> {
        let url = format!("{}/v1/chat/completions", self.config.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&json!({
                "model": model.unwrap_or(DEFAULT_MODEL),
                "messages": [{ "role": "user", "content": prompt }],
            }))
            .send()
            .await
            .map_err(|e| ClientError::from_reqwest(e, LLM_TIMEOUT))?;

        let body: Value = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::Protocol(e.to_string()))?;

        let text = body
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| ClientError::Protocol("no completion in response".into()))?
            .to_owned();

        Ok(LlmReply {
            text,
            signature: body
                .get("signature")
                .and_then(Value::as_str)
                .map(str::to_owned),
            verifying_key: body
                .get("verifying_key")
                .and_then(Value::as_str)
                .map(str::to_owned),
            attestation: body.get("attestation").filter(|a| !a.is_null()).cloned(),
        })
    }
}
