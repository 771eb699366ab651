//! Repository functions — one function per store operation.
//!
//! Every function takes a `&Store` and returns a `Result<T, StoreError>`.
//! No business logic, no domain types — pure document access.

pub mod connectors;
pub mod jobs;
pub mod ledger;
pub mod runs;
pub mod triggers;
pub mod workflows;
