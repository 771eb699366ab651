//! `store` crate — pure persistence layer.
//!
//! Provides an embedded document store, typed record structs, and repository
//! functions for every record family shieldflow persists.  No business logic
//! lives here.

pub mod error;
pub mod models;
pub mod repository;
pub mod secrets;

use std::path::Path;

use serde::{de::DeserializeOwned, Serialize};

pub use error::StoreError;
pub use secrets::SecretBox;

/// Handle to the embedded document store.
///
/// One sled tree per record family; all values are JSON documents.  Cloning
/// is cheap and the handle is safe to share across tasks.
#[derive(Clone)]
pub struct Store {
    #[allow(dead_code)]
    db: sled::Db,
    pub(crate) workflows: sled::Tree,
    pub(crate) runs: sled::Tree,
    pub(crate) triggers: sled::Tree,
    pub(crate) connectors: sled::Tree,
    pub(crate) ledger: sled::Tree,
    pub(crate) balances: sled::Tree,
    pub(crate) jobs: sled::Tree,
}

impl Store {
    /// Open (or create) the store at the given filesystem path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        tracing::info!("Opening document store at {}", path.as_ref().display());
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Open an ephemeral store that is discarded on drop.  Used by tests.
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self, StoreError> {
        Ok(Self {
            workflows: db.open_tree("workflows")?,
            runs: db.open_tree("runs")?,
            triggers: db.open_tree("triggers")?,
            connectors: db.open_tree("connectors")?,
            ledger: db.open_tree("ledger")?,
            balances: db.open_tree("balances")?,
            jobs: db.open_tree("jobs")?,
            db,
        })
    }
}

// ---------------------------------------------------------------------------
// Tree helpers shared by the repository modules.
// ---------------------------------------------------------------------------

pub(crate) fn put<T: Serialize>(
    tree: &sled::Tree,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec(value)?;
    tree.insert(key.as_bytes(), bytes)?;
    Ok(())
}

pub(crate) fn fetch<T: DeserializeOwned>(
    tree: &sled::Tree,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match tree.get(key.as_bytes())? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

pub(crate) fn fetch_required<T: DeserializeOwned>(
    tree: &sled::Tree,
    key: &str,
) -> Result<T, StoreError> {
    fetch(tree, key)?.ok_or(StoreError::NotFound)
}
