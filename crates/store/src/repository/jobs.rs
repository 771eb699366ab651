//! Durable job queue primitives.
//!
//! Workers claim jobs through a compare-and-swap on the job document so the
//! claim is exclusive per job id even with many workers polling.  Queue
//! policy (backoff, retention) lives in the `queue` crate; this module is
//! pure persistence.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{JobRecord, JobStatus};
use crate::{fetch, fetch_required, put, Store, StoreError};

/// Persist a new job for the given run.
pub fn enqueue(
    store: &Store,
    run_id: Uuid,
    max_attempts: u32,
    available_at: DateTime<Utc>,
) -> Result<JobRecord, StoreError> {
    let now = Utc::now();
    let job = JobRecord {
        id: Uuid::new_v4(),
        run_id,
        status: JobStatus::Pending,
        attempts: 0,
        max_attempts,
        available_at,
        created_at: now,
        updated_at: now,
        last_error: None,
    };
    put(&store.jobs, &job.id.to_string(), &job)?;
    Ok(job)
}

pub fn get(store: &Store, id: Uuid) -> Result<JobRecord, StoreError> {
    fetch_required(&store.jobs, &id.to_string())
}

pub fn find(store: &Store, id: Uuid) -> Result<Option<JobRecord>, StoreError> {
    fetch(&store.jobs, &id.to_string())
}

/// Atomically claim the next due pending job and mark it `processing`.
///
/// The compare-and-swap guarantees that concurrent workers never claim the
/// same job; a worker that loses the race moves on to the next candidate.
///
/// Returns `None` when nothing is due.
pub fn claim_next(store: &Store, now: DateTime<Utc>) -> Result<Option<JobRecord>, StoreError> {
    for item in store.jobs.iter() {
        let (key, bytes) = item?;
        let job: JobRecord = serde_json::from_slice(&bytes)?;
        if job.status != JobStatus::Pending || job.available_at > now {
            continue;
        }

        let mut claimed = job;
        claimed.status = JobStatus::Processing;
        claimed.attempts += 1;
        claimed.updated_at = now;
        let new_bytes = serde_json::to_vec(&claimed)?;

        match store
            .jobs
            .compare_and_swap(&key, Some(bytes), Some(new_bytes))?
        {
            Ok(()) => return Ok(Some(claimed)),
            // Another worker got there first; keep scanning.
            Err(_) => continue,
        }
    }
    Ok(None)
}

/// Jobs delivering the given run, in no particular order.
pub fn list_for_run(store: &Store, run_id: Uuid) -> Result<Vec<JobRecord>, StoreError> {
    let mut out = Vec::new();
    for item in store.jobs.iter() {
        let (_, bytes) = item?;
        let job: JobRecord = serde_json::from_slice(&bytes)?;
        if job.run_id == run_id {
            out.push(job);
        }
    }
    Ok(out)
}

/// Overwrite a job record, bumping `updated_at`.
pub fn save(store: &Store, mut job: JobRecord) -> Result<JobRecord, StoreError> {
    job.updated_at = Utc::now();
    put(&store.jobs, &job.id.to_string(), &job)?;
    Ok(job)
}

/// Drop the oldest terminal jobs beyond the retention caps.
pub fn prune_terminal(
    store: &Store,
    keep_succeeded: usize,
    keep_failed: usize,
) -> Result<(), StoreError> {
    let mut succeeded: Vec<JobRecord> = Vec::new();
    let mut failed: Vec<JobRecord> = Vec::new();

    for item in store.jobs.iter() {
        let (_, bytes) = item?;
        let job: JobRecord = serde_json::from_slice(&bytes)?;
        match job.status {
            JobStatus::Succeeded => succeeded.push(job),
            JobStatus::Failed => failed.push(job),
            _ => {}
        }
    }

    for (mut jobs, keep) in [(succeeded, keep_succeeded), (failed, keep_failed)] {
        if jobs.len() <= keep {
            continue;
        }
        // Newest first; everything past the cap is removed.
        jobs.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        for job in jobs.drain(keep..) {
            store.jobs.remove(job.id.to_string().as_bytes())?;
        }
    }
    Ok(())
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn claim_is_exclusive_and_respects_visibility() {
        let store = Store::temporary().expect("open store");
        let now = Utc::now();

        let due = enqueue(&store, Uuid::new_v4(), 5, now - Duration::seconds(1)).unwrap();
        enqueue(&store, Uuid::new_v4(), 5, now + Duration::seconds(60)).unwrap();

        let first = claim_next(&store, now).unwrap().expect("one job due");
        assert_eq!(first.id, due.id);
        assert_eq!(first.status, JobStatus::Processing);
        assert_eq!(first.attempts, 1);

        // The delayed job is not visible yet and the claimed one is taken.
        assert!(claim_next(&store, now).unwrap().is_none());
    }

    #[test]
    fn prune_keeps_newest_terminal_jobs() {
        let store = Store::temporary().expect("open store");
        let now = Utc::now();

        for _ in 0..5 {
            let job = enqueue(&store, Uuid::new_v4(), 5, now).unwrap();
            let mut done = job;
            done.status = JobStatus::Succeeded;
            save(&store, done).unwrap();
        }

        prune_terminal(&store, 2, 2).unwrap();

        let remaining = store.jobs.iter().count();
        assert_eq!(remaining, 2);
    }
}
