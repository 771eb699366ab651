//! The worker pool.
//!
//! Each worker claims one job at a time, drives the engine, and settles the
//! job: ack on success, re-deliver with backoff on retryable failure, move
//! to failed when fatal or when attempts are exhausted.  A job whose run is
//! already terminal is acked without executing — the idempotent re-delivery
//! safety net.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use engine::Executor;
use store::models::{JobRecord, JobStatus};
use store::repository::{jobs, runs};

use crate::{JobQueue, QueueError};

/// Default worker count.
pub const DEFAULT_CONCURRENCY: usize = 5;

pub struct WorkerPool {
    queue: JobQueue,
    executor: Arc<Executor>,
    concurrency: usize,
}

impl WorkerPool {
    pub fn new(queue: JobQueue, executor: Arc<Executor>, concurrency: usize) -> Self {
        Self {
            queue,
            executor,
            concurrency,
        }
    }

    /// Spawn the workers.  They run until the shutdown signal flips.
    pub fn start(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        info!(concurrency = self.concurrency, "starting worker pool");
        (0..self.concurrency)
            .map(|worker| {
                let queue = self.queue.clone();
                let executor = self.executor.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    worker_loop(worker, queue, executor, shutdown).await;
                })
            })
            .collect()
    }
}

async fn worker_loop(
    worker: usize,
    queue: JobQueue,
    executor: Arc<Executor>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            info!(worker, "worker shutting down");
            return;
        }

        match jobs::claim_next(queue.store(), Utc::now()) {
            Ok(Some(job)) => {
                if let Err(err) = process(&queue, &executor, job).await {
                    error!(worker, "job settlement failed: {err}");
                }
            }
            Ok(None) => {
                tokio::select! {
                    _ = shutdown.changed() => {}
                    _ = tokio::time::sleep(queue.config().poll_interval) => {}
                }
            }
            Err(err) => {
                error!(worker, "job claim failed: {err}");
                tokio::time::sleep(queue.config().poll_interval).await;
            }
        }
    }
}

async fn process(
    queue: &JobQueue,
    executor: &Executor,
    mut job: JobRecord,
) -> Result<(), QueueError> {
    let store = queue.store();

    // Terminal run ⇒ stale re-delivery; ack without executing.
    match runs::find(store, job.run_id)? {
        Some(run) if run.status.is_terminal() => {
            job.status = JobStatus::Succeeded;
            jobs::save(store, job)?;
            return prune(queue);
        }
        Some(_) => {}
        None => {
            job.status = JobStatus::Failed;
            job.last_error = Some("run record not found".to_owned());
            jobs::save(store, job)?;
            return prune(queue);
        }
    }

    match executor.execute(job.run_id).await {
        Ok(_) => {
            job.status = JobStatus::Succeeded;
            jobs::save(store, job)?;
            prune(queue)
        }
        Err(err) if err.retryable() && job.attempts < job.max_attempts => {
            let delay = queue.config().backoff_delay(job.attempts);
            warn!(
                run_id = %job.run_id,
                attempt = job.attempts,
                max_attempts = job.max_attempts,
                ?delay,
                "retryable failure, re-queueing: {err}"
            );
            job.status = JobStatus::Pending;
            job.available_at = Utc::now()
                + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
            job.last_error = Some(err.to_string());
            jobs::save(store, job)?;
            Ok(())
        }
        Err(err) => {
            warn!(run_id = %job.run_id, attempts = job.attempts, "job failed: {err}");
            job.status = JobStatus::Failed;
            job.last_error = Some(err.to_string());
            let job_run_id = job.run_id;
            jobs::save(store, job)?;

            // Attempts exhausted on a retryable error: the engine left the
            // run non-terminal, so finalize it here.
            if let Some(run) = runs::find(store, job_run_id)? {
                if !run.status.is_terminal() {
                    runs::finish_failure(store, job_run_id, err.to_run_error())?;
                }
            }
            prune(queue)
        }
    }
}

fn prune(queue: &JobQueue) -> Result<(), QueueError> {
    jobs::prune_terminal(
        queue.store(),
        queue.config().keep_succeeded,
        queue.config().keep_failed,
    )?;
    Ok(())
}

// ============================================================
// Integration tests (worker + engine + store, mock handlers)
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::QueueConfig;
    use blocks::mock::MockHandler;
    use blocks::{BlockKind, BlockRegistry};
    use serde_json::json;
    use std::time::Duration;
    use store::models::RunStatus;
    use store::repository::{ledger, workflows};
    use store::{SecretBox, Store};

    const TENANT: &str = "acme";

    fn single_node_graph() -> serde_json::Value {
        json!({
            "nodes": [ { "id": "a", "blockId": "payload-input", "alias": "out", "data": {} } ],
            "edges": [],
        })
    }

    fn fast_config() -> QueueConfig {
        QueueConfig {
            backoff_base: Duration::from_millis(10),
            poll_interval: Duration::from_millis(10),
            ..QueueConfig::default()
        }
    }

    fn pool_with_handler(
        store: &Store,
        handler: Arc<MockHandler>,
        config: QueueConfig,
    ) -> (JobQueue, WorkerPool) {
        let mut registry = BlockRegistry::new();
        registry.register(BlockKind::PayloadInput, handler);
        let executor = Arc::new(Executor::new(
            store.clone(),
            SecretBox::new("test-key"),
            registry,
        ));
        let queue = JobQueue::new(store.clone(), config);
        let pool = WorkerPool::new(queue.clone(), executor, 2);
        (queue, pool)
    }

    async fn wait_until(mut check: impl FnMut() -> bool) {
        for _ in 0..400 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("condition not reached within deadline");
    }

    #[tokio::test]
    async fn retry_then_success_records_attempts() {
        let store = Store::temporary().unwrap();
        ledger::credit(&store, TENANT, 100, None).unwrap();

        // Fails on attempts 1 and 2, succeeds on attempt 3.
        let handler = Arc::new(MockHandler::flaky("flaky", 2, json!({ "ok": true })));
        let (queue, pool) = pool_with_handler(&store, handler.clone(), fast_config());

        let workflow = workflows::create(&store, TENANT, "wf", single_node_graph(), None).unwrap();
        let run = queue.create_run(workflow.id, None, json!({})).unwrap();

        let (tx, rx) = watch::channel(false);
        let handles = pool.start(rx);

        wait_until(|| {
            runs::get(&store, run.id).unwrap().status == RunStatus::Succeeded
        })
        .await;

        let record = runs::get(&store, run.id).unwrap();
        assert_eq!(record.attempts, 3);
        assert_eq!(handler.call_count(), 3);

        tx.send(true).unwrap();
        for handle in handles {
            let _ = handle.await;
        }
    }

    #[tokio::test]
    async fn exhausted_attempts_finalize_the_run_failed() {
        let store = Store::temporary().unwrap();
        ledger::credit(&store, TENANT, 100, None).unwrap();

        let handler = Arc::new(MockHandler::failing_transient("down", "upstream 503"));
        let config = QueueConfig {
            max_attempts: 2,
            ..fast_config()
        };
        let (queue, pool) = pool_with_handler(&store, handler.clone(), config);

        let workflow = workflows::create(&store, TENANT, "wf", single_node_graph(), None).unwrap();
        let run = queue.create_run(workflow.id, None, json!({})).unwrap();

        let (tx, rx) = watch::channel(false);
        let handles = pool.start(rx);

        wait_until(|| runs::get(&store, run.id).unwrap().status == RunStatus::Failed).await;

        let record = runs::get(&store, run.id).unwrap();
        assert_eq!(record.attempts, 2);
        assert_eq!(record.error.unwrap().kind, "handler_transient");
        assert_eq!(handler.call_count(), 2);

        tx.send(true).unwrap();
        for handle in handles {
            let _ = handle.await;
        }
    }

    #[tokio::test]
    async fn terminal_runs_are_acked_without_execution() {
        let store = Store::temporary().unwrap();

        let handler = Arc::new(MockHandler::returning("h", json!(1)));
        let (queue, pool) = pool_with_handler(&store, handler.clone(), fast_config());

        let workflow = workflows::create(&store, TENANT, "wf", single_node_graph(), None).unwrap();
        let run = queue.create_run(workflow.id, None, json!({})).unwrap();
        runs::finish_success(&store, run.id, json!({})).unwrap();

        let (tx, rx) = watch::channel(false);
        let handles = pool.start(rx);

        wait_until(|| {
            jobs::list_for_run(&store, run.id)
                .unwrap()
                .iter()
                .all(|job| job.status == JobStatus::Succeeded)
        })
        .await;

        assert_eq!(handler.call_count(), 0);

        tx.send(true).unwrap();
        for handle in handles {
            let _ = handle.await;
        }
    }

    #[tokio::test]
    async fn fatal_failures_are_not_retried() {
        let store = Store::temporary().unwrap();
        ledger::credit(&store, TENANT, 100, None).unwrap();

        let handler = Arc::new(MockHandler::failing_permanent("bad", "422 from upstream"));
        let (queue, pool) = pool_with_handler(&store, handler.clone(), fast_config());

        let workflow = workflows::create(&store, TENANT, "wf", single_node_graph(), None).unwrap();
        let run = queue.create_run(workflow.id, None, json!({})).unwrap();

        let (tx, rx) = watch::channel(false);
        let handles = pool.start(rx);

        wait_until(|| runs::get(&store, run.id).unwrap().status == RunStatus::Failed).await;

        // One delivery, no re-queue.
        assert_eq!(handler.call_count(), 1);
        assert_eq!(
            runs::get(&store, run.id).unwrap().error.unwrap().kind,
            "handler_permanent"
        );

        tx.send(true).unwrap();
        for handle in handles {
            let _ = handle.await;
        }
    }
}
