//! Schedule runner — fires cron-bound published workflows.
//!
//! Registration is by rescan: every cycle reads the published workflows, so
//! a newly published workflow picks up its schedule within one cycle and a
//! paused one is dropped.  Invalid cron expressions are logged and skipped.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;
use serde_json::{json, Value};
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

use queue::JobQueue;
use store::models::{TriggerStatus, TriggerType};
use store::repository::{triggers, workflows};
use store::Store;

use crate::SCHEDULE_INTERVAL;

pub struct ScheduleRunner {
    store: Store,
    queue: JobQueue,
    /// Next due instant per registered trigger.
    next_fire: HashMap<Uuid, DateTime<Utc>>,
}

/// Parse a cron expression.  Five-field expressions get a seconds field
/// prepended; six- and seven-field expressions pass through.
fn parse_cron(expression: &str) -> Option<Schedule> {
    let normalized = if expression.split_whitespace().count() == 5 {
        format!("0 {expression}")
    } else {
        expression.to_owned()
    };
    Schedule::from_str(&normalized).ok()
}

impl ScheduleRunner {
    pub fn new(store: Store, queue: JobQueue) -> Self {
        Self {
            store,
            queue,
            next_fire: HashMap::new(),
        }
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(SCHEDULE_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => { self.tick(Utc::now()); }
                _ = shutdown.changed() => if *shutdown.borrow() { return },
            }
        }
    }

    /// One scan cycle; returns the number of runs created.
    pub fn tick(&mut self, now: DateTime<Utc>) -> usize {
        let published = match workflows::list_published(&self.store) {
            Ok(list) => list,
            Err(err) => {
                warn!("schedule scan failed: {err}");
                return 0;
            }
        };

        let mut created = 0;
        let mut registered: HashSet<Uuid> = HashSet::new();

        for workflow in published {
            let Some(trigger_id) = workflow.trigger_id else {
                continue;
            };
            let trigger = match triggers::find(&self.store, trigger_id) {
                Ok(Some(t)) => t,
                Ok(None) => continue,
                Err(err) => {
                    warn!("trigger load failed: {err}");
                    continue;
                }
            };
            if trigger.trigger_type != TriggerType::Cron
                || trigger.status != TriggerStatus::Active
            {
                continue;
            }

            let Some(expression) = trigger
                .config
                .get("expression")
                .and_then(Value::as_str)
            else {
                warn!(trigger_id = %trigger.id, "cron trigger has no expression");
                continue;
            };
            let Some(schedule) = parse_cron(expression) else {
                warn!(trigger_id = %trigger.id, expression, "invalid cron expression, skipping");
                continue;
            };

            registered.insert(trigger.id);

            match self.next_fire.get(&trigger.id).copied() {
                None => {
                    // First sight of this trigger: register, don't fire.
                    if let Some(next) = schedule.after(&now).next() {
                        info!(trigger_id = %trigger.id, %next, "schedule registered");
                        self.next_fire.insert(trigger.id, next);
                    }
                }
                Some(due) if now >= due => {
                    let payload = json!({ "scheduledAt": due.to_rfc3339() });
                    match self
                        .queue
                        .create_run(workflow.id, Some(trigger.id), payload)
                    {
                        Ok(run) => {
                            info!(run_id = %run.id, workflow_id = %workflow.id, "cron fired");
                            created += 1;
                        }
                        Err(err) => warn!("cron run submission failed: {err}"),
                    }
                    if let Some(next) = schedule.after(&now).next() {
                        self.next_fire.insert(trigger.id, next);
                    }
                }
                Some(_) => {}
            }
        }

        // Workflows that were paused or re-bound drop out of the scan; their
        // schedules deregister here.
        self.next_fire.retain(|id, _| registered.contains(id));

        created
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use queue::QueueConfig;
    use store::repository::runs;

    fn setup() -> (Store, JobQueue) {
        let store = Store::temporary().unwrap();
        let queue = JobQueue::new(store.clone(), QueueConfig::default());
        (store, queue)
    }

    fn cron_workflow(store: &Store, expression: &str) -> (Uuid, Uuid) {
        let trigger = triggers::create(
            store,
            "t1",
            TriggerType::Cron,
            json!({ "expression": expression }),
            None,
        )
        .unwrap();
        let workflow =
            workflows::create(store, "t1", "scheduled", json!({ "nodes": [] }), Some(trigger.id))
                .unwrap();
        workflows::publish(store, workflow.id).unwrap();
        (workflow.id, trigger.id)
    }

    #[test]
    fn five_field_expressions_parse() {
        assert!(parse_cron("*/5 * * * *").is_some());
        assert!(parse_cron("0 0 * * * *").is_some());
        assert!(parse_cron("definitely not cron").is_none());
    }

    #[test]
    fn first_scan_registers_without_firing() {
        let (store, queue) = setup();
        let (workflow_id, trigger_id) = cron_workflow(&store, "* * * * *");
        let mut runner = ScheduleRunner::new(store.clone(), queue);

        assert_eq!(runner.tick(Utc::now()), 0);
        assert!(runner.next_fire.contains_key(&trigger_id));
        assert!(runs::list_for_workflow(&store, workflow_id).unwrap().is_empty());
    }

    #[test]
    fn due_schedule_fires_and_rearms() {
        let (store, queue) = setup();
        let (workflow_id, trigger_id) = cron_workflow(&store, "* * * * *");
        let mut runner = ScheduleRunner::new(store.clone(), queue);

        let now = Utc::now();
        runner.tick(now);
        // Force the registered schedule due.
        runner.next_fire.insert(trigger_id, now - Duration::seconds(1));

        assert_eq!(runner.tick(now), 1);
        let created = runs::list_for_workflow(&store, workflow_id).unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].trigger_id, Some(trigger_id));
        assert!(created[0].payload.get("scheduledAt").is_some());

        // Re-armed in the future: an immediate rescan does not double-fire.
        assert_eq!(runner.tick(now), 0);
    }

    #[test]
    fn invalid_expression_is_skipped() {
        let (store, queue) = setup();
        let (workflow_id, _) = cron_workflow(&store, "not a cron");
        let mut runner = ScheduleRunner::new(store.clone(), queue);

        assert_eq!(runner.tick(Utc::now()), 0);
        assert!(runner.next_fire.is_empty());
        assert!(runs::list_for_workflow(&store, workflow_id).unwrap().is_empty());
    }

    #[test]
    fn paused_workflow_deregisters() {
        let (store, queue) = setup();
        let (workflow_id, trigger_id) = cron_workflow(&store, "* * * * *");
        let mut runner = ScheduleRunner::new(store.clone(), queue);
        runner.tick(Utc::now());
        assert!(runner.next_fire.contains_key(&trigger_id));

        let mut record = workflows::get(&store, workflow_id).unwrap();
        record.status = store::models::WorkflowStatus::Paused;
        workflows::save(&store, record).unwrap();

        runner.tick(Utc::now());
        assert!(!runner.next_fire.contains_key(&trigger_id));
    }
}
