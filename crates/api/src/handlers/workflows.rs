use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use uuid::Uuid;

use engine::{validate_graph, Graph};
use store::models::TriggerType;
use store::repository::{triggers as trigger_repo, workflows as wf_repo};
use store::StoreError;

use super::AppState;

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorkflowDto {
    #[serde(default = "default_tenant")]
    pub tenant: String,
    pub name: String,
    pub graph: Value,
    #[serde(default)]
    pub trigger_id: Option<Uuid>,
}

fn default_tenant() -> String {
    "default".to_owned()
}

/// Create a workflow in `draft`.  Structural validation happens at publish
/// (and again at every run start).
pub async fn create(
    State(state): State<AppState>,
    Json(payload): Json<CreateWorkflowDto>,
) -> Result<(StatusCode, Json<Value>), StatusCode> {
    let workflow = wf_repo::create(
        &state.store,
        &payload.tenant,
        &payload.name,
        payload.graph,
        payload.trigger_id,
    )
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok((StatusCode::CREATED, Json(json!({ "workflow": workflow }))))
}

/// Transition draft→published.  The graph must validate; published
/// workflows are what triggers execute.
pub async fn publish(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<Value>, StatusCode> {
    let record = match wf_repo::find(&state.store, id) {
        Ok(Some(record)) => record,
        Ok(None) => return Err(StatusCode::NOT_FOUND),
        Err(_) => return Err(StatusCode::INTERNAL_SERVER_ERROR),
    };

    let graph = Graph::from_value(&record.graph).map_err(|_| StatusCode::UNPROCESSABLE_ENTITY)?;
    if graph.nodes.is_empty() {
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }
    validate_graph(&graph).map_err(|_| StatusCode::UNPROCESSABLE_ENTITY)?;

    let published = wf_repo::publish(&state.store, id).map_err(|err| match err {
        StoreError::NotFound => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    })?;

    let mut body = json!({ "workflow": published });
    if let Some(snippet) = integration_snippet(&state, &published.trigger_id) {
        body["integrationSnippet"] = Value::String(snippet);
    }
    Ok(Json(body))
}

/// For webhook-bound workflows, a copy-paste example of the inbound call.
fn integration_snippet(state: &AppState, trigger_id: &Option<Uuid>) -> Option<String> {
    let trigger_id = (*trigger_id)?;
    let trigger = trigger_repo::find(&state.store, trigger_id).ok()??;
    if !matches!(
        trigger.trigger_type,
        TriggerType::Webhook | TriggerType::ForgeWebhook
    ) {
        return None;
    }
    let base = state.public_url.as_deref().unwrap_or("http://localhost:8080");
    Some(format!(
        "curl -X POST {base}/triggers/hooks/{trigger_id} -H 'Content-Type: application/json' -d '{{}}'"
    ))
}
