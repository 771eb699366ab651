//! Webhook intake and trigger testing.
//!
//! The intake endpoint is unauthenticated at the HTTP layer; trust comes
//! from the per-trigger secret.  Forge-style triggers carry an HMAC-SHA256
//! body signature, plain webhooks an exact shared secret header.  Both are
//! compared in constant time.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::warn;
use uuid::Uuid;

use store::models::{TriggerRecord, TriggerStatus, TriggerType};
use store::repository::{connectors, triggers as trigger_repo, workflows as wf_repo};

use super::AppState;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_HEADER: &str = "x-hub-signature-256";
const SECRET_HEADER: &str = "x-trigger-secret";

/// POST /triggers/hooks/:triggerId — convert an inbound webhook into a run.
pub async fn intake(
    Path(trigger_id): Path<Uuid>,
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, StatusCode> {
    let trigger = match trigger_repo::find(&state.store, trigger_id) {
        Ok(Some(trigger)) if trigger.status == TriggerStatus::Active => trigger,
        Ok(_) => return Err(StatusCode::NOT_FOUND),
        Err(_) => return Err(StatusCode::INTERNAL_SERVER_ERROR),
    };

    match trigger.trigger_type {
        TriggerType::ForgeWebhook => {
            let secret = shared_secret(&state, &trigger)
                .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;
            let signature = headers
                .get(SIGNATURE_HEADER)
                .and_then(|v| v.to_str().ok());
            if !verify_forge_signature(&secret, &body, signature) {
                warn!(%trigger_id, "webhook signature mismatch");
                return Err(StatusCode::FORBIDDEN);
            }
        }
        TriggerType::Webhook => {
            if let Some(secret) = trigger.config.get("secret").and_then(Value::as_str) {
                let provided = headers
                    .get(SECRET_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("");
                if !constant_time_eq(secret, provided) {
                    warn!(%trigger_id, "webhook secret mismatch");
                    return Err(StatusCode::FORBIDDEN);
                }
            }
        }
        // Poll-style triggers have no inbound endpoint.
        _ => return Err(StatusCode::NOT_FOUND),
    }

    let workflow = match wf_repo::find_published_for_trigger(&state.store, trigger_id) {
        Ok(Some(workflow)) => workflow,
        Ok(None) => return Err(StatusCode::NOT_FOUND),
        Err(_) => return Err(StatusCode::INTERNAL_SERVER_ERROR),
    };

    let payload: Value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).map_err(|_| StatusCode::BAD_REQUEST)?
    };

    let run = state
        .queue
        .create_run(workflow.id, Some(trigger_id), payload)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(json!({ "runId": run.id, "status": "queued" })))
}

/// POST /triggers/:id/test — enqueue a synthetic run for the bound
/// workflow.
pub async fn test_trigger(
    Path(trigger_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<Value>, StatusCode> {
    match trigger_repo::find(&state.store, trigger_id) {
        Ok(Some(_)) => {}
        Ok(None) => return Err(StatusCode::NOT_FOUND),
        Err(_) => return Err(StatusCode::INTERNAL_SERVER_ERROR),
    }

    let workflow = match wf_repo::find_published_for_trigger(&state.store, trigger_id) {
        Ok(Some(workflow)) => workflow,
        Ok(None) => return Err(StatusCode::NOT_FOUND),
        Err(_) => return Err(StatusCode::INTERNAL_SERVER_ERROR),
    };

    let payload = json!({ "test": true, "triggeredAt": Utc::now().to_rfc3339() });
    let run = state
        .queue
        .create_run(workflow.id, Some(trigger_id), payload)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(json!({ "runId": run.id })))
}

/// Shared secret for a forge trigger: the connector's `secret` field wins,
/// the trigger config is the fallback.
fn shared_secret(state: &AppState, trigger: &TriggerRecord) -> Option<String> {
    if let Some(connector_id) = trigger.connector_id {
        if let Ok(record) = connectors::get_decrypted(&state.store, &state.secret_box, connector_id)
        {
            if let Some(secret) = record.config.get("secret").and_then(Value::as_str) {
                return Some(secret.to_owned());
            }
        }
    }
    trigger
        .config
        .get("secret")
        .and_then(Value::as_str)
        .map(str::to_owned)
}

/// `X-Hub-Signature-256: sha256=<hex>` verification, constant-time via the
/// MAC's own comparison.
fn verify_forge_signature(secret: &str, body: &[u8], header: Option<&str>) -> bool {
    let Some(signature_hex) = header.and_then(|h| h.strip_prefix("sha256=")) else {
        return false;
    };
    let Ok(signature) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&signature).is_ok()
}

fn constant_time_eq(expected: &str, provided: &str) -> bool {
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}

// ============================================================
// Handler tests (no network; the router is exercised in-process)
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::{router, AppState};
    use axum::body::Body;
    use axum::http::Request;
    use queue::{JobQueue, QueueConfig};
    use store::models::RunStatus;
    use store::repository::{ledger, runs};
    use store::{SecretBox, Store};
    use tower::ServiceExt;

    fn state() -> AppState {
        let store = Store::temporary().unwrap();
        AppState {
            queue: JobQueue::new(store.clone(), QueueConfig::default()),
            secret_box: SecretBox::new("test-key"),
            store,
            public_url: None,
        }
    }

    fn bound_published_workflow(
        state: &AppState,
        trigger_type: TriggerType,
        trigger_config: Value,
        connector_config: Option<Value>,
    ) -> (Uuid, Uuid) {
        let connector_id = connector_config.map(|config| {
            connectors::create(&state.store, &state.secret_box, "t1", "webhook", config)
                .unwrap()
                .id
        });
        let trigger = trigger_repo::create(
            &state.store,
            "t1",
            trigger_type,
            trigger_config,
            connector_id,
        )
        .unwrap();
        let workflow = wf_repo::create(
            &state.store,
            "t1",
            "hooked",
            json!({ "nodes": [ { "id": "a", "blockId": "payload-input", "data": {} } ] }),
            Some(trigger.id),
        )
        .unwrap();
        wf_repo::publish(&state.store, workflow.id).unwrap();
        (workflow.id, trigger.id)
    }

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    async fn post_hook(
        state: AppState,
        trigger_id: Uuid,
        body: &str,
        header: Option<(&str, String)>,
    ) -> axum::http::Response<Body> {
        let mut request = Request::builder()
            .method("POST")
            .uri(format!("/triggers/hooks/{trigger_id}"))
            .header("content-type", "application/json");
        if let Some((name, value)) = header {
            request = request.header(name, value);
        }
        router(state)
            .oneshot(request.body(Body::from(body.to_owned())).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn forged_signature_is_rejected_without_side_effects() {
        let state = state();
        let (workflow_id, trigger_id) = bound_published_workflow(
            &state,
            TriggerType::ForgeWebhook,
            json!({}),
            Some(json!({ "secret": "s" })),
        );

        let response = post_hook(
            state.clone(),
            trigger_id,
            r#"{"ping":1}"#,
            Some((SIGNATURE_HEADER, "sha256=deadbeef".to_owned())),
        )
        .await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(runs::list_for_workflow(&state.store, workflow_id)
            .unwrap()
            .is_empty());
        assert!(ledger::entries(&state.store, "t1").unwrap().is_empty());
    }

    #[tokio::test]
    async fn valid_signature_queues_a_run() {
        let state = state();
        let (workflow_id, trigger_id) = bound_published_workflow(
            &state,
            TriggerType::ForgeWebhook,
            json!({}),
            Some(json!({ "secret": "s" })),
        );

        let body = r#"{"ping":1}"#;
        let response = post_hook(
            state.clone(),
            trigger_id,
            body,
            Some((SIGNATURE_HEADER, sign("s", body.as_bytes()))),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let created = runs::list_for_workflow(&state.store, workflow_id).unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].status, RunStatus::Pending);
        assert_eq!(created[0].payload, json!({ "ping": 1 }));
    }

    #[tokio::test]
    async fn wrong_plain_secret_never_creates_a_run() {
        let state = state();
        let (workflow_id, trigger_id) = bound_published_workflow(
            &state,
            TriggerType::Webhook,
            json!({ "secret": "right" }),
            None,
        );

        let response = post_hook(
            state.clone(),
            trigger_id,
            r#"{"x":1}"#,
            Some((SECRET_HEADER, "wrong".to_owned())),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(runs::list_for_workflow(&state.store, workflow_id)
            .unwrap()
            .is_empty());

        // Missing header is equally rejected.
        let response = post_hook(state.clone(), trigger_id, r#"{"x":1}"#, None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn correct_plain_secret_queues_a_run() {
        let state = state();
        let (_, trigger_id) = bound_published_workflow(
            &state,
            TriggerType::Webhook,
            json!({ "secret": "right" }),
            None,
        );

        let response = post_hook(
            state.clone(),
            trigger_id,
            r#"{"x":1}"#,
            Some((SECRET_HEADER, "right".to_owned())),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unbound_or_unpublished_workflows_yield_404() {
        let state = state();
        // Trigger with no workflow bound at all.
        let trigger = trigger_repo::create(
            &state.store,
            "t1",
            TriggerType::Webhook,
            json!({}),
            None,
        )
        .unwrap();

        let response = post_hook(state.clone(), trigger.id, r#"{}"#, None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
