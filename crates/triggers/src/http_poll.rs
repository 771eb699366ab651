//! Generic HTTP poll runner with change detection.
//!
//! Each active `http-poll` trigger names an endpoint (directly or through
//! its connector), a dotted `recordsPath` into the response, an optional
//! per-record condition, and change-detection settings.  Surviving records
//! each become one run, up to the trigger's batch cap.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

use blocks::path;
use queue::JobQueue;
use store::models::TriggerType;
use store::repository::{connectors, triggers, workflows};
use store::{SecretBox, Store};

use crate::HTTP_POLL_INTERVAL;

const MIN_POLL_MS: u64 = 10_000;
const DEFAULT_POLL_MS: u64 = 30_000;
const DEFAULT_MAX_BATCH: usize = 50;
const MAX_BATCH_CAP: usize = 200;

#[derive(Default)]
struct PollState {
    last_poll: Option<DateTime<Utc>>,
    /// record identity → content hash
    seen: HashMap<String, String>,
}

pub struct HttpPoller {
    store: Store,
    queue: JobQueue,
    secret_box: SecretBox,
    http: reqwest::Client,
    state: HashMap<Uuid, PollState>,
}

impl HttpPoller {
    pub fn new(store: Store, queue: JobQueue, secret_box: SecretBox) -> Self {
        Self {
            store,
            queue,
            secret_box,
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            state: HashMap::new(),
        }
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(HTTP_POLL_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => { self.tick(Utc::now()).await; }
                _ = shutdown.changed() => if *shutdown.borrow() { return },
            }
        }
    }

    /// One poll cycle; returns the number of runs created.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> usize {
        let active = match triggers::list_active(&self.store, TriggerType::HttpPoll) {
            Ok(list) => list,
            Err(err) => {
                warn!("http poll scan failed: {err}");
                return 0;
            }
        };

        let mut created = 0;
        for trigger in active {
            let config = trigger.config.clone();

            // Per-trigger cadence, floored at 10s.
            let cadence_ms = config
                .get("pollIntervalMs")
                .and_then(Value::as_u64)
                .unwrap_or(DEFAULT_POLL_MS)
                .max(MIN_POLL_MS);
            let state = self.state.entry(trigger.id).or_default();
            if let Some(last) = state.last_poll {
                if now - last < chrono::Duration::milliseconds(cadence_ms as i64) {
                    continue;
                }
            }
            state.last_poll = Some(now);

            let workflow = match workflows::find_published_for_trigger(&self.store, trigger.id) {
                Ok(Some(w)) => w,
                Ok(None) => continue,
                Err(err) => {
                    warn!("workflow lookup failed: {err}");
                    continue;
                }
            };

            let connector = match trigger.connector_id {
                Some(id) => {
                    match connectors::get_decrypted(&self.store, &self.secret_box, id) {
                        Ok(record) => Some(record.config),
                        Err(err) => {
                            warn!(trigger_id = %trigger.id, "connector load failed: {err}");
                            continue;
                        }
                    }
                }
                None => None,
            };

            let body = match fetch(&self.http, &trigger.id, &config, connector.as_ref()).await {
                Some(body) => body,
                None => continue,
            };

            let records: Vec<Value> = match config.get("recordsPath").and_then(Value::as_str) {
                Some(records_path) => match path::resolve(&body, records_path) {
                    Some(Value::Array(items)) => items.clone(),
                    _ => {
                        warn!(trigger_id = %trigger.id, records_path, "recordsPath is not an array");
                        continue;
                    }
                },
                None => match body.as_array() {
                    Some(items) => items.clone(),
                    None => {
                        warn!(trigger_id = %trigger.id, "response root is not an array");
                        continue;
                    }
                },
            };

            let max_batch = config
                .get("maxBatch")
                .and_then(Value::as_u64)
                .map(|n| n as usize)
                .unwrap_or(DEFAULT_MAX_BATCH)
                .min(MAX_BATCH_CAP);
            let change_detection = config
                .get("changeDetection")
                .and_then(Value::as_bool)
                .unwrap_or(true);
            let record_id_path = config.get("recordIdPath").and_then(Value::as_str);
            let watch_fields: Option<Vec<String>> = config
                .get("watchFields")
                .and_then(Value::as_array)
                .map(|fields| {
                    fields
                        .iter()
                        .filter_map(|f| f.as_str().map(str::to_owned))
                        .collect()
                });

            let mut batch = 0;
            for record in &records {
                if batch >= max_batch {
                    break;
                }
                if !condition_passes(record, &config) {
                    continue;
                }

                if change_detection {
                    let identity = record_identity(record, record_id_path);
                    let hash = record_hash(record, watch_fields.as_deref());
                    if state.seen.get(&identity) == Some(&hash) {
                        continue;
                    }
                    state.seen.insert(identity, hash);
                }

                match self
                    .queue
                    .create_run(workflow.id, Some(trigger.id), record.clone())
                {
                    Ok(run) => {
                        info!(run_id = %run.id, trigger_id = %trigger.id, "poll record matched");
                        created += 1;
                        batch += 1;
                    }
                    Err(err) => warn!("poll run submission failed: {err}"),
                }
            }
        }
        created
    }
}

/// Fetch the trigger's endpoint: trigger url (absolute, or joined with the
/// connector's baseUrl), connector headers ∪ trigger headers with the
/// trigger winning, bearer auth from the connector.
async fn fetch(
    http: &reqwest::Client,
    trigger_id: &Uuid,
    config: &Value,
    connector: Option<&Value>,
) -> Option<Value> {
    let configured_url = config.get("url").and_then(Value::as_str)?;
    let url = if configured_url.starts_with("http://") || configured_url.starts_with("https://") {
        configured_url.to_owned()
    } else {
        let base = connector?.get("baseUrl").and_then(Value::as_str)?;
        format!(
            "{}/{}",
            base.trim_end_matches('/'),
            configured_url.trim_start_matches('/')
        )
    };

    let mut headers: Map<String, Value> = Map::new();
    if let Some(map) = connector
        .and_then(|c| c.get("headers"))
        .and_then(Value::as_object)
    {
        headers.extend(map.clone());
    }
    if let Some(map) = config.get("headers").and_then(Value::as_object) {
        headers.extend(map.clone());
    }

    let mut request = http.get(&url);
    for (name, value) in &headers {
        if let Some(value) = value.as_str() {
            request = request.header(name.as_str(), value);
        }
    }
    if !headers.keys().any(|k| k.eq_ignore_ascii_case("authorization")) {
        if let Some(token) = connector
            .and_then(|c| c.get("apiKey").or_else(|| c.get("token")))
            .and_then(Value::as_str)
        {
            request = request.bearer_auth(token);
        }
    }

    match request.send().await {
        Ok(response) if response.status().is_success() => match response.json().await {
            Ok(body) => Some(body),
            Err(err) => {
                warn!(%trigger_id, "poll response was not json: {err}");
                None
            }
        },
        Ok(response) => {
            warn!(%trigger_id, status = %response.status(), "poll endpoint returned error");
            None
        }
        Err(err) => {
            warn!(%trigger_id, "poll request failed: {err}");
            None
        }
    }
}

/// Apply the trigger's optional per-record condition gate.
fn condition_passes(record: &Value, config: &Value) -> bool {
    let Some(field) = config.get("conditionField").and_then(Value::as_str) else {
        return true;
    };
    let operator = config
        .get("conditionOperator")
        .and_then(Value::as_str)
        .unwrap_or("equals");
    let expected = config.get("conditionValue");
    let actual = path::resolve(record, field);

    fn as_number(value: Option<&Value>) -> Option<f64> {
        match value? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    fn contains(actual: Option<&Value>, expected: Option<&Value>) -> bool {
        match (actual, expected) {
            (Some(Value::String(s)), Some(Value::String(needle))) => s.contains(needle.as_str()),
            (Some(Value::Array(items)), Some(needle)) => items.contains(needle),
            _ => false,
        }
    }

    match operator {
        "exists" => actual.is_some(),
        "not_exists" => actual.is_none(),
        "equals" => actual == expected,
        "not_equals" => actual != expected,
        "gt" | "lt" | "gte" | "lte" => {
            let (Some(a), Some(b)) = (as_number(actual), as_number(expected)) else {
                return false;
            };
            match operator {
                "gt" => a > b,
                "lt" => a < b,
                "gte" => a >= b,
                _ => a <= b,
            }
        }
        "contains" => contains(actual, expected),
        "not_contains" => !contains(actual, expected),
        other => {
            warn!(operator = other, "unknown condition operator, record skipped");
            false
        }
    }
}

/// Identity for dedup: the resolved `recordIdPath`, falling back to the full
/// record serialization.  serde_json preserves field order, so byte-stable
/// sources dedup stably; re-ordered records count as new.
fn record_identity(record: &Value, record_id_path: Option<&str>) -> String {
    match record_id_path.and_then(|p| path::resolve(record, p)) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => record.to_string(),
    }
}

/// Content hash: the whole record, or just `watchFields` when configured.
fn record_hash(record: &Value, watch_fields: Option<&[String]>) -> String {
    let hashed = match watch_fields {
        Some(fields) if !fields.is_empty() => {
            let mut subset = Map::new();
            for field in fields {
                if let Some(value) = path::resolve(record, field) {
                    subset.insert(field.clone(), value.clone());
                }
            }
            Value::Object(subset).to_string()
        }
        _ => record.to_string(),
    };
    hex::encode(Sha256::digest(hashed.as_bytes()))
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use queue::QueueConfig;
    use serde_json::json;
    use store::repository::runs;
    use wiremock::matchers::{method, path as url_path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn poll_setup(config: Value) -> (Store, HttpPoller, Uuid) {
        let store = Store::temporary().unwrap();
        let queue = JobQueue::new(store.clone(), QueueConfig::default());

        let trigger = triggers::create(&store, "t1", TriggerType::HttpPoll, config, None).unwrap();
        let workflow =
            workflows::create(&store, "t1", "poll", json!({ "nodes": [] }), Some(trigger.id))
                .unwrap();
        workflows::publish(&store, workflow.id).unwrap();

        let poller = HttpPoller::new(store.clone(), queue, SecretBox::new("k"));
        (store, poller, workflow.id)
    }

    #[tokio::test]
    async fn unchanged_records_create_exactly_one_run() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path("/feed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [ { "id": "r1", "status": "open" } ],
            })))
            .mount(&server)
            .await;

        let (store, mut poller, workflow_id) = poll_setup(json!({
            "url": format!("{}/feed", server.uri()),
            "recordsPath": "items",
            "recordIdPath": "id",
        }));

        let now = Utc::now();
        assert_eq!(poller.tick(now).await, 1);
        // Second cycle sees identical data.
        assert_eq!(poller.tick(now + Duration::seconds(35)).await, 0);

        let created = runs::list_for_workflow(&store, workflow_id).unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].payload["id"], "r1");
    }

    #[tokio::test]
    async fn changed_watch_field_fires_again() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path("/feed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [ { "id": "r1", "status": "open", "noise": 1 } ],
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(url_path("/feed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [ { "id": "r1", "status": "closed", "noise": 1 } ],
            })))
            .mount(&server)
            .await;

        let (store, mut poller, workflow_id) = poll_setup(json!({
            "url": format!("{}/feed", server.uri()),
            "recordsPath": "items",
            "recordIdPath": "id",
            "watchFields": ["status"],
        }));

        let now = Utc::now();
        assert_eq!(poller.tick(now).await, 1);
        assert_eq!(poller.tick(now + Duration::seconds(35)).await, 1);

        assert_eq!(runs::list_for_workflow(&store, workflow_id).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn cadence_floor_suppresses_rapid_polls() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path("/feed"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([ { "id": "r1" } ])),
            )
            .mount(&server)
            .await;

        let (store, mut poller, workflow_id) = poll_setup(json!({
            "url": format!("{}/feed", server.uri()),
            "recordIdPath": "id",
            // Below the floor; effective cadence is 10s.
            "pollIntervalMs": 1,
        }));

        let now = Utc::now();
        assert_eq!(poller.tick(now).await, 1);
        // 5s later is inside the 10s floor: no fetch, no runs.
        assert_eq!(poller.tick(now + Duration::seconds(5)).await, 0);
        assert_eq!(runs::list_for_workflow(&store, workflow_id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn max_batch_caps_run_creation() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path("/feed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": "r1" }, { "id": "r2" }, { "id": "r3" },
            ])))
            .mount(&server)
            .await;

        let (store, mut poller, workflow_id) = poll_setup(json!({
            "url": format!("{}/feed", server.uri()),
            "recordIdPath": "id",
            "maxBatch": 2,
        }));

        assert_eq!(poller.tick(Utc::now()).await, 2);
        assert_eq!(runs::list_for_workflow(&store, workflow_id).unwrap().len(), 2);
    }

    #[test]
    fn condition_operator_table() {
        let record = json!({ "status": "open", "count": 5, "tags": ["a", "b"] });
        let config = |op: &str, value: Value| {
            json!({ "conditionField": "status", "conditionOperator": op, "conditionValue": value })
        };

        assert!(condition_passes(&record, &config("equals", json!("open"))));
        assert!(!condition_passes(&record, &config("not_equals", json!("open"))));
        assert!(condition_passes(&record, &config("contains", json!("op"))));
        assert!(!condition_passes(&record, &config("not_contains", json!("op"))));
        assert!(condition_passes(
            &record,
            &json!({ "conditionField": "count", "conditionOperator": "gt", "conditionValue": 3 }),
        ));
        assert!(condition_passes(
            &record,
            &json!({ "conditionField": "count", "conditionOperator": "lte", "conditionValue": 5 }),
        ));
        assert!(!condition_passes(
            &record,
            &json!({ "conditionField": "count", "conditionOperator": "lt", "conditionValue": 5 }),
        ));
        assert!(condition_passes(
            &record,
            &json!({ "conditionField": "status", "conditionOperator": "exists" }),
        ));
        assert!(condition_passes(
            &record,
            &json!({ "conditionField": "missing", "conditionOperator": "not_exists" }),
        ));
        // No condition configured: everything passes.
        assert!(condition_passes(&record, &json!({})));
    }

    #[test]
    fn identity_falls_back_to_full_record_json() {
        let record = json!({ "a": 1 });
        assert_eq!(record_identity(&record, None), record.to_string());
        assert_eq!(
            record_identity(&json!({ "id": "x" }), Some("id")),
            "x"
        );
    }
}
