//! Connector record operations.
//!
//! Secret fields are encrypted on the way in and only ever leave this module
//! decrypted for point-of-use callers (triggers and block handlers).  The
//! listing form masks them.

use chrono::Utc;
use uuid::Uuid;

use crate::models::ConnectorRecord;
use crate::secrets::{self, SecretBox};
use crate::{fetch, fetch_required, put, Store, StoreError};

/// Persist a connector, encrypting secret-named config fields.
pub fn create(
    store: &Store,
    secret_box: &SecretBox,
    tenant: &str,
    connector_type: &str,
    mut config: serde_json::Value,
) -> Result<ConnectorRecord, StoreError> {
    secret_box.encrypt_config(&mut config)?;
    let record = ConnectorRecord {
        id: Uuid::new_v4(),
        tenant: tenant.to_owned(),
        connector_type: connector_type.to_owned(),
        config,
        created_at: Utc::now(),
    };
    put(&store.connectors, &record.id.to_string(), &record)?;
    Ok(record)
}

/// Raw record as stored (secrets still sealed).
pub fn get(store: &Store, id: Uuid) -> Result<ConnectorRecord, StoreError> {
    fetch_required(&store.connectors, &id.to_string())
}

pub fn find(store: &Store, id: Uuid) -> Result<Option<ConnectorRecord>, StoreError> {
    fetch(&store.connectors, &id.to_string())
}

/// Record with secret fields decrypted for point of use.
pub fn get_decrypted(
    store: &Store,
    secret_box: &SecretBox,
    id: Uuid,
) -> Result<ConnectorRecord, StoreError> {
    let mut record = get(store, id)?;
    record.config = secret_box.decrypt_config(&record.config)?;
    Ok(record)
}

/// Client-facing listing: secret fields replaced by `***`.
pub fn list_masked(store: &Store, tenant: &str) -> Result<Vec<ConnectorRecord>, StoreError> {
    let mut out = Vec::new();
    for item in store.connectors.iter() {
        let (_, bytes) = item?;
        let mut record: ConnectorRecord = serde_json::from_slice(&bytes)?;
        if record.tenant != tenant {
            continue;
        }
        record.config = secrets::mask_config(&record.config);
        out.push(record);
    }
    Ok(out)
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn secrets_sealed_at_rest_and_decrypted_at_point_of_use() {
        let store = Store::temporary().expect("open store");
        let secret_box = SecretBox::new("k");

        let record = create(
            &store,
            &secret_box,
            "t1",
            "http",
            json!({ "baseUrl": "https://api.example.com", "apiKey": "sk-42" }),
        )
        .unwrap();

        let stored = get(&store, record.id).unwrap();
        assert!(stored.config["apiKey"].as_str().unwrap().starts_with("enc:"));

        let open = get_decrypted(&store, &secret_box, record.id).unwrap();
        assert_eq!(open.config["apiKey"], "sk-42");

        let listed = list_masked(&store, "t1").unwrap();
        assert_eq!(listed[0].config["apiKey"], "***");
    }
}
