//! Workflow record operations.

use chrono::Utc;
use uuid::Uuid;

use crate::models::{WorkflowRecord, WorkflowStatus};
use crate::{fetch, fetch_required, put, Store, StoreError};

/// Persist a new workflow in `draft` status.
pub fn create(
    store: &Store,
    tenant: &str,
    name: &str,
    graph: serde_json::Value,
    trigger_id: Option<Uuid>,
) -> Result<WorkflowRecord, StoreError> {
    let now = Utc::now();
    let record = WorkflowRecord {
        id: Uuid::new_v4(),
        tenant: tenant.to_owned(),
        name: name.to_owned(),
        status: WorkflowStatus::Draft,
        trigger_id,
        dataset_id: None,
        graph,
        version: 1,
        created_at: now,
        updated_at: now,
    };
    put(&store.workflows, &record.id.to_string(), &record)?;
    Ok(record)
}

pub fn get(store: &Store, id: Uuid) -> Result<WorkflowRecord, StoreError> {
    fetch_required(&store.workflows, &id.to_string())
}

pub fn find(store: &Store, id: Uuid) -> Result<Option<WorkflowRecord>, StoreError> {
    fetch(&store.workflows, &id.to_string())
}

/// Overwrite a workflow record, bumping `updated_at`.
pub fn save(store: &Store, mut record: WorkflowRecord) -> Result<WorkflowRecord, StoreError> {
    record.updated_at = Utc::now();
    put(&store.workflows, &record.id.to_string(), &record)?;
    Ok(record)
}

/// Transition a workflow to `published`, bumping the definition version.
pub fn publish(store: &Store, id: Uuid) -> Result<WorkflowRecord, StoreError> {
    let mut record = get(store, id)?;
    record.status = WorkflowStatus::Published;
    record.version += 1;
    save(store, record)
}

pub fn list(store: &Store) -> Result<Vec<WorkflowRecord>, StoreError> {
    let mut out = Vec::new();
    for item in store.workflows.iter() {
        let (_, bytes) = item?;
        out.push(serde_json::from_slice(&bytes)?);
    }
    Ok(out)
}

/// All `published` workflows — the only ones triggers may start.
pub fn list_published(store: &Store) -> Result<Vec<WorkflowRecord>, StoreError> {
    Ok(list(store)?
        .into_iter()
        .filter(|w: &WorkflowRecord| w.status == WorkflowStatus::Published)
        .collect())
}

/// The published workflow bound to the given trigger, if any.
pub fn find_published_for_trigger(
    store: &Store,
    trigger_id: Uuid,
) -> Result<Option<WorkflowRecord>, StoreError> {
    Ok(list_published(store)?
        .into_iter()
        .find(|w| w.trigger_id == Some(trigger_id)))
}
