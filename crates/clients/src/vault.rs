//! Encrypted-storage vault client.
//!
//! Records live in named collections keyed by caller-supplied keys; the
//! vault encrypts server-side and hands back an opaque state key reference
//! on write.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::http::{build_client, check_status, env_var_or, DEFAULT_HTTP_TIMEOUT};
use crate::ClientError;

#[async_trait]
pub trait StorageVault: Send + Sync {
    /// Write a record; returns the opaque state key reference.
    async fn store_record(
        &self,
        collection: &str,
        key: &str,
        value: &Value,
    ) -> Result<String, ClientError>;

    /// Read a record back; `None` when the key does not exist.
    async fn read_record(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Option<Value>, ClientError>;
}

#[derive(Debug, Clone)]
pub struct VaultConfig {
    pub base_url: String,
    pub api_key: String,
}

impl VaultConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: env_var_or("NILDB_BASE_URL", "http://127.0.0.1:40080"),
            api_key: env_var_or("NILDB_API_KEY", ""),
        }
    }
}

pub struct NildbClient {
    http: reqwest::Client,
    config: VaultConfig,
}

impl NildbClient {
    pub fn new(config: VaultConfig) -> Self {
        Self {
            http: build_client(DEFAULT_HTTP_TIMEOUT),
            config,
        }
    }
}

#[async_trait]
impl StorageVault for NildbClient {
    async fn store_record(
        &self,
        collection: &str,
        key: &str,
        value: &Value,
    ) -> Result<String, ClientError> {
        let url = format!("{}/v1/data/{collection}", self.config.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&json!({ "key": key, "value": value }))
            .send()
            .await
            .map_err(|e| ClientError::from_reqwest(e, DEFAULT_HTTP_TIMEOUT))?;

        let body: Value = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::Protocol(e.to_string()))?;

        body.get("stateKey")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| ClientError::Protocol("vault returned no stateKey".into()))
    }

    async fn read_record(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Option<Value>, ClientError> {
        let url = format!("{}/v1/data/{collection}/{key}", self.config.base_url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|e| ClientError::from_reqwest(e, DEFAULT_HTTP_TIMEOUT))?;

        if response.status().as_u16() == 404 {
            return Ok(None);
        }

        let body: Value = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::Protocol(e.to_string()))?;

        Ok(Some(body.get("value").cloned().unwrap_or(body)))
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> NildbClient {
        NildbClient::new(VaultConfig {
            base_url: server.uri(),
            api_key: "vault-key".to_owned(),
        })
    }

    #[tokio::test]
    async fn store_returns_the_state_key_reference() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/data/state"))
            .and(header("authorization", "Bearer vault-key"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "stateKey": "sk-abc" })),
            )
            .mount(&server)
            .await;

        let state_key = client(&server)
            .store_record("state", "k1", &json!({ "approved": true }))
            .await
            .unwrap();
        assert_eq!(state_key, "sk-abc");
    }

    #[tokio::test]
    async fn missing_records_read_as_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/data/state/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let value = client(&server).read_record("state", "missing").await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn auth_rejection_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/data/state/k1"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = client(&server).read_record("state", "k1").await.unwrap_err();
        assert!(err.is_unauthenticated());
    }
}
