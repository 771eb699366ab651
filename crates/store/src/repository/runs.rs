//! Run record operations.

use chrono::Utc;
use uuid::Uuid;

use crate::models::{RunError, RunRecord, RunStatus};
use crate::secrets;
use crate::{fetch, fetch_required, put, Store, StoreError};

/// Create a run in `pending` status.
pub fn create(
    store: &Store,
    workflow_id: Uuid,
    trigger_id: Option<Uuid>,
    payload: serde_json::Value,
) -> Result<RunRecord, StoreError> {
    let record = RunRecord {
        id: Uuid::new_v4(),
        workflow_id,
        trigger_id,
        payload,
        status: RunStatus::Pending,
        result: None,
        error: None,
        attempts: 0,
        created_at: Utc::now(),
        started_at: None,
        ended_at: None,
    };
    put(&store.runs, &record.id.to_string(), &record)?;
    Ok(record)
}

pub fn get(store: &Store, id: Uuid) -> Result<RunRecord, StoreError> {
    fetch_required(&store.runs, &id.to_string())
}

pub fn find(store: &Store, id: Uuid) -> Result<Option<RunRecord>, StoreError> {
    fetch(&store.runs, &id.to_string())
}

/// Runs for one workflow, newest first.
pub fn list_for_workflow(store: &Store, workflow_id: Uuid) -> Result<Vec<RunRecord>, StoreError> {
    let mut out: Vec<RunRecord> = Vec::new();
    for item in store.runs.iter() {
        let (_, bytes) = item?;
        let record: RunRecord = serde_json::from_slice(&bytes)?;
        if record.workflow_id == workflow_id {
            out.push(record);
        }
    }
    out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(out)
}

/// Transition a run to `running`, recording the attempt.
pub fn mark_running(store: &Store, id: Uuid) -> Result<RunRecord, StoreError> {
    let mut record = get(store, id)?;
    record.status = RunStatus::Running;
    record.started_at = Some(Utc::now());
    record.attempts += 1;
    put(&store.runs, &record.id.to_string(), &record)?;
    Ok(record)
}

/// Finalize a run as `succeeded`.  Terminal runs are never touched again.
pub fn finish_success(
    store: &Store,
    id: Uuid,
    result: serde_json::Value,
) -> Result<RunRecord, StoreError> {
    let mut record = get(store, id)?;
    record.status = RunStatus::Succeeded;
    record.result = Some(result);
    record.ended_at = Some(Utc::now());
    put(&store.runs, &record.id.to_string(), &record)?;
    Ok(record)
}

/// Record the error of a retryable attempt without finalizing the run; the
/// queue will re-deliver it.  The message is redacted first.
pub fn record_error(store: &Store, id: Uuid, error: RunError) -> Result<RunRecord, StoreError> {
    let mut record = get(store, id)?;
    record.error = Some(RunError {
        message: secrets::redact(&error.message),
        ..error
    });
    put(&store.runs, &record.id.to_string(), &record)?;
    Ok(record)
}

/// Finalize a run as `failed`.  The error message is redacted before it is
/// persisted so secret material never lands on a run record.
pub fn finish_failure(store: &Store, id: Uuid, error: RunError) -> Result<RunRecord, StoreError> {
    let mut record = get(store, id)?;
    record.status = RunStatus::Failed;
    record.error = Some(RunError {
        message: secrets::redact(&error.message),
        ..error
    });
    record.ended_at = Some(Utc::now());
    put(&store.runs, &record.id.to_string(), &record)?;
    Ok(record)
}
