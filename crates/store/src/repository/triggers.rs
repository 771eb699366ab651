//! Trigger record operations.

use chrono::Utc;
use uuid::Uuid;

use crate::models::{TriggerRecord, TriggerStatus, TriggerType};
use crate::{fetch, fetch_required, put, Store, StoreError};

pub fn create(
    store: &Store,
    tenant: &str,
    trigger_type: TriggerType,
    config: serde_json::Value,
    connector_id: Option<Uuid>,
) -> Result<TriggerRecord, StoreError> {
    let record = TriggerRecord {
        id: Uuid::new_v4(),
        tenant: tenant.to_owned(),
        trigger_type,
        config,
        connector_id,
        status: TriggerStatus::Active,
        created_at: Utc::now(),
    };
    put(&store.triggers, &record.id.to_string(), &record)?;
    Ok(record)
}

pub fn get(store: &Store, id: Uuid) -> Result<TriggerRecord, StoreError> {
    fetch_required(&store.triggers, &id.to_string())
}

pub fn find(store: &Store, id: Uuid) -> Result<Option<TriggerRecord>, StoreError> {
    fetch(&store.triggers, &id.to_string())
}

pub fn save(store: &Store, record: &TriggerRecord) -> Result<(), StoreError> {
    put(&store.triggers, &record.id.to_string(), record)
}

/// Active triggers of one type — what a poll supervisor iterates.
pub fn list_active(store: &Store, trigger_type: TriggerType) -> Result<Vec<TriggerRecord>, StoreError> {
    let mut out = Vec::new();
    for item in store.triggers.iter() {
        let (_, bytes) = item?;
        let record: TriggerRecord = serde_json::from_slice(&bytes)?;
        if record.status == TriggerStatus::Active && record.trigger_type == trigger_type {
            out.push(record);
        }
    }
    Ok(out)
}
