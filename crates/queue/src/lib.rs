//! `queue` crate — durable at-least-once delivery of runs to workers.
//!
//! Jobs are persisted through the store's `jobs` tree before anything
//! executes, so queued work survives restarts.  Workers claim jobs
//! exclusively and re-deliver retryable failures with exponential backoff.

pub mod worker;

use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use store::models::{JobRecord, RunRecord};
use store::repository::{jobs, runs};
use store::{Store, StoreError};

pub use worker::WorkerPool;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Queue policy knobs.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Delivery attempts per job before it moves to failed.
    pub max_attempts: u32,
    /// Base delay of the exponential backoff.
    pub backoff_base: Duration,
    pub backoff_factor: u32,
    /// Terminal jobs retained for inspection.
    pub keep_succeeded: usize,
    pub keep_failed: usize,
    /// Worker poll cadence when the queue is empty.
    pub poll_interval: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_base: Duration::from_secs(5),
            backoff_factor: 2,
            keep_succeeded: 100,
            keep_failed: 500,
            poll_interval: Duration::from_millis(250),
        }
    }
}

impl QueueConfig {
    /// Delay before re-delivery after `attempt` failed attempts:
    /// `base × factor^(attempt-1)`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff_base * self.backoff_factor.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Per-enqueue overrides.
#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    pub delay: Option<Duration>,
    pub max_attempts: Option<u32>,
}

/// Handle for submitting work.  Cheap to clone; safe to share with the API
/// layer and the trigger supervisors.
#[derive(Clone)]
pub struct JobQueue {
    store: Store,
    config: QueueConfig,
}

impl JobQueue {
    pub fn new(store: Store, config: QueueConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub(crate) fn store(&self) -> &Store {
        &self.store
    }

    /// Persist a job delivering `run_id` to a worker.
    pub fn enqueue(&self, run_id: Uuid, options: EnqueueOptions) -> Result<JobRecord, QueueError> {
        let available_at = Utc::now()
            + chrono::Duration::from_std(options.delay.unwrap_or_default())
                .unwrap_or_else(|_| chrono::Duration::zero());
        let max_attempts = options.max_attempts.unwrap_or(self.config.max_attempts);
        Ok(jobs::enqueue(&self.store, run_id, max_attempts, available_at)?)
    }

    /// The submission path every trigger and API handler uses: persist the
    /// run `pending`, then enqueue its job.
    pub fn create_run(
        &self,
        workflow_id: Uuid,
        trigger_id: Option<Uuid>,
        payload: serde_json::Value,
    ) -> Result<RunRecord, QueueError> {
        let run = runs::create(&self.store, workflow_id, trigger_id, payload)?;
        self.enqueue(run.id, EnqueueOptions::default())?;
        tracing::info!(run_id = %run.id, workflow_id = %workflow_id, "run queued");
        Ok(run)
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_from_the_five_second_base() {
        let config = QueueConfig::default();
        assert_eq!(config.backoff_delay(1), Duration::from_secs(5));
        assert_eq!(config.backoff_delay(2), Duration::from_secs(10));
        assert_eq!(config.backoff_delay(3), Duration::from_secs(20));
        assert_eq!(config.backoff_delay(4), Duration::from_secs(40));
    }

    #[test]
    fn create_run_persists_pending_run_and_job() {
        let store = Store::temporary().unwrap();
        let queue = JobQueue::new(store.clone(), QueueConfig::default());

        let run = queue
            .create_run(Uuid::new_v4(), None, serde_json::json!({ "x": 1 }))
            .unwrap();

        let stored = runs::get(&store, run.id).unwrap();
        assert_eq!(stored.status, store::models::RunStatus::Pending);

        let job = jobs::claim_next(&store, Utc::now()).unwrap().unwrap();
        assert_eq!(job.run_id, run.id);
    }
}
