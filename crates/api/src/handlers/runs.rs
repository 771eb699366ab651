use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use uuid::Uuid;

use store::repository::{runs as run_repo, workflows as wf_repo};

use super::AppState;

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRunDto {
    pub workflow_id: Uuid,
    #[serde(default)]
    pub payload: Value,
}

/// Manual run submission.  Draft workflows may run here (the builder's
/// test button); triggers only ever start published ones.
pub async fn submit(
    State(state): State<AppState>,
    Json(body): Json<SubmitRunDto>,
) -> Result<(StatusCode, Json<Value>), StatusCode> {
    match wf_repo::find(&state.store, body.workflow_id) {
        Ok(Some(_)) => {}
        Ok(None) => return Err(StatusCode::NOT_FOUND),
        Err(_) => return Err(StatusCode::INTERNAL_SERVER_ERROR),
    }

    let run = state
        .queue
        .create_run(body.workflow_id, None, body.payload)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok((StatusCode::ACCEPTED, Json(json!({ "run": run }))))
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRunsQuery {
    pub workflow_id: Uuid,
}

pub async fn list(
    Query(query): Query<ListRunsQuery>,
    State(state): State<AppState>,
) -> Result<Json<Value>, StatusCode> {
    let runs = run_repo::list_for_workflow(&state.store, query.workflow_id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(json!({ "runs": runs })))
}
