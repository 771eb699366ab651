//! Action blocks: `connector-request`, `custom-http-action`.
//!
//! Both perform an HTTP call and bind the response body under the node's
//! `responseAlias`.  `connector-request` composes the URL and headers from
//! a stored connector; `custom-http-action` takes an absolute URL.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::{BlockContext, BlockError, BlockErrorKind, BlockHandler, BlockOutput};

const ACTION_TIMEOUT: Duration = Duration::from_secs(30);

fn classify_status(status: u16, message: String) -> BlockError {
    let kind = if status == 401 || status == 403 {
        BlockErrorKind::Unauthenticated
    } else if status == 408 || status == 429 || status >= 500 {
        BlockErrorKind::Transient
    } else {
        BlockErrorKind::Permanent
    };
    BlockError {
        kind,
        message: format!("http {status}: {message}"),
    }
}

fn header_pairs(value: Option<&Value>) -> Vec<(String, String)> {
    value
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| Some((k.clone(), v.as_str()?.to_owned())))
                .collect()
        })
        .unwrap_or_default()
}

async fn perform(
    http: &reqwest::Client,
    method: &str,
    url: &str,
    headers: Vec<(String, String)>,
    body: Option<Value>,
) -> Result<Value, BlockError> {
    let method: reqwest::Method = method
        .to_ascii_uppercase()
        .parse()
        .map_err(|_| BlockError::config(format!("invalid http method '{method}'")))?;

    let mut request = http.request(method, url);
    for (name, value) in headers {
        request = request.header(name, value);
    }
    if let Some(body) = body {
        request = request.json(&body);
    }

    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            BlockError::transient(format!("request timed out after {ACTION_TIMEOUT:?}"))
        } else {
            BlockError::transient(format!("transport error: {e}"))
        }
    })?;

    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    if !(200..300).contains(&status) {
        return Err(classify_status(status, text));
    }

    // JSON bodies are bound structurally; anything else as a plain string.
    Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
}

fn request_body(ctx: &BlockContext<'_>) -> Option<Value> {
    ctx.config
        .get("bodyPath")
        .or_else(|| ctx.config.get("body"))
        .cloned()
}

/// `connector-request` — HTTP call through a stored connector.
pub struct ConnectorRequest {
    http: reqwest::Client,
}

impl ConnectorRequest {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(ACTION_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }
}

impl Default for ConnectorRequest {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlockHandler for ConnectorRequest {
    async fn execute(&self, ctx: &BlockContext<'_>) -> Result<BlockOutput, BlockError> {
        let connector = ctx
            .connector
            .ok_or_else(|| BlockError::config("connector-request requires a bound connector"))?;

        let base = connector
            .get("baseUrl")
            .and_then(Value::as_str)
            .ok_or_else(|| BlockError::config("connector has no baseUrl"))?;
        let endpoint = ctx.config_str("endpoint").unwrap_or("");
        let url = format!("{}/{}", base.trim_end_matches('/'), endpoint.trim_start_matches('/'));

        // Connector headers first, node headers override.
        let mut headers: Map<String, Value> = Map::new();
        if let Some(map) = connector.get("headers").and_then(Value::as_object) {
            headers.extend(map.clone());
        }
        if let Some(map) = ctx.config.get("headers").and_then(Value::as_object) {
            headers.extend(map.clone());
        }
        let mut pairs = header_pairs(Some(&Value::Object(headers)));

        if !pairs.iter().any(|(k, _)| k.eq_ignore_ascii_case("authorization")) {
            if let Some(auth) = connector.get("authorization").and_then(Value::as_str) {
                pairs.push(("Authorization".to_owned(), auth.to_owned()));
            } else if let Some(token) = connector
                .get("apiKey")
                .or_else(|| connector.get("token"))
                .and_then(Value::as_str)
            {
                pairs.push(("Authorization".to_owned(), format!("Bearer {token}")));
            }
        }

        let method = ctx.config_str("method").unwrap_or("POST");
        let value = perform(&self.http, method, &url, pairs, request_body(ctx)).await?;
        Ok(BlockOutput::value(value))
    }
}

/// `custom-http-action` — HTTP call against an absolute URL.
pub struct CustomHttpAction {
    http: reqwest::Client,
}

impl CustomHttpAction {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(ACTION_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }
}

impl Default for CustomHttpAction {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlockHandler for CustomHttpAction {
    async fn execute(&self, ctx: &BlockContext<'_>) -> Result<BlockOutput, BlockError> {
        let url = ctx.require_str("url")?;
        let method = ctx.config_str("method").unwrap_or("POST");
        let headers = header_pairs(ctx.config.get("headers"));

        let value = perform(&self.http, method, url, headers, request_body(ctx)).await?;
        Ok(BlockOutput::value(value))
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ctx<'a>(
        config: &'a Value,
        payload: &'a Value,
        memory: &'a Map<String, Value>,
        inputs: &'a HashMap<String, Value>,
        connector: Option<&'a Value>,
    ) -> BlockContext<'a> {
        BlockContext {
            run_id: uuid::Uuid::new_v4(),
            node_id: "act",
            config,
            payload,
            memory,
            inputs,
            connector,
        }
    }

    #[tokio::test]
    async fn connector_request_composes_url_headers_and_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orders"))
            .and(header("authorization", "Bearer sk-42"))
            .and(header("x-team", "ops"))
            .and(body_json(json!({ "id": 7 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .mount(&server)
            .await;

        let connector = json!({
            "baseUrl": server.uri(),
            "apiKey": "sk-42",
            "headers": { "x-team": "default" },
        });
        // `bodyPath` arrives already dereferenced by the engine.
        let config = json!({
            "endpoint": "/orders",
            "headers": { "x-team": "ops" },
            "bodyPath": { "id": 7 },
        });
        let payload = json!({});
        let memory = Map::new();
        let inputs = HashMap::new();

        let out = ConnectorRequest::new()
            .execute(&ctx(&config, &payload, &memory, &inputs, Some(&connector)))
            .await
            .unwrap();
        assert_eq!(out.value, json!({ "ok": true }));
    }

    #[tokio::test]
    async fn server_errors_are_transient_and_client_errors_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/bad"))
            .respond_with(ResponseTemplate::new(422))
            .mount(&server)
            .await;

        let payload = json!({});
        let memory = Map::new();
        let inputs = HashMap::new();

        let config = json!({ "url": format!("{}/flaky", server.uri()) });
        let err = CustomHttpAction::new()
            .execute(&ctx(&config, &payload, &memory, &inputs, None))
            .await
            .unwrap_err();
        assert_eq!(err.kind, BlockErrorKind::Transient);

        let config = json!({ "url": format!("{}/bad", server.uri()) });
        let err = CustomHttpAction::new()
            .execute(&ctx(&config, &payload, &memory, &inputs, None))
            .await
            .unwrap_err();
        assert_eq!(err.kind, BlockErrorKind::Permanent);
    }

    #[tokio::test]
    async fn missing_connector_is_a_config_error() {
        let config = json!({ "endpoint": "/x" });
        let payload = json!({});
        let memory = Map::new();
        let inputs = HashMap::new();

        let err = ConnectorRequest::new()
            .execute(&ctx(&config, &payload, &memory, &inputs, None))
            .await
            .unwrap_err();
        assert_eq!(err.kind, BlockErrorKind::ConfigInvalid);
    }
}
