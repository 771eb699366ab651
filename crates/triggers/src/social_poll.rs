//! Social-feed poller — posts and mentions become runs.
//!
//! Each active `social-post` trigger carries a bearer-token connector and a
//! user id.  The poller fetches the timeline and/or mentions since the
//! per-trigger watermark, applies the optional keyword filter, and creates
//! one run per surviving post.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

use clients::{SocialFeed, SocialPost};
use queue::JobQueue;
use store::models::TriggerType;
use store::repository::{connectors, triggers, workflows};
use store::{SecretBox, Store};

use crate::SOCIAL_POLL_INTERVAL;

const MIN_POLL_MS: u64 = 30_000;
const DEFAULT_POLL_MS: u64 = 60_000;

#[derive(Default)]
struct FeedState {
    last_poll: Option<DateTime<Utc>>,
    last_post_id: Option<String>,
    last_mention_id: Option<String>,
}

pub struct SocialPoller {
    store: Store,
    queue: JobQueue,
    secret_box: SecretBox,
    social: Arc<dyn SocialFeed>,
    state: HashMap<Uuid, FeedState>,
}

/// Comma/semicolon/pipe-separated keywords, lowercased; empty means no
/// filtering.
fn parse_keywords(config: &Value) -> Vec<String> {
    config
        .get("keywords")
        .and_then(Value::as_str)
        .map(|raw| {
            raw.split([',', ';', '|'])
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn keyword_match(post: &SocialPost, keywords: &[String]) -> bool {
    if keywords.is_empty() {
        return true;
    }
    let text = post.text.to_lowercase();
    keywords.iter().any(|k| text.contains(k))
}

impl SocialPoller {
    pub fn new(
        store: Store,
        queue: JobQueue,
        secret_box: SecretBox,
        social: Arc<dyn SocialFeed>,
    ) -> Self {
        Self {
            store,
            queue,
            secret_box,
            social,
            state: HashMap::new(),
        }
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(SOCIAL_POLL_INTERVAL);
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
        let active = match triggers::list_active(&self.store, TriggerType::SocialPost) {
            Ok(list) => list,
            Err(err) => {
                warn!("social poll scan failed: {err}");
                return 0;
            }
        };

        let mut created = 0;
        for trigger in active {
            let config = &trigger.config;

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

            let Some(connector_id) = trigger.connector_id else {
                warn!(trigger_id = %trigger.id, "social-post trigger has no connector");
                continue;
            };
            let connector =
                match connectors::get_decrypted(&self.store, &self.secret_box, connector_id) {
                    Ok(record) => record.config,
                    Err(err) => {
                        warn!(trigger_id = %trigger.id, "connector load failed: {err}");
                        continue;
                    }
                };
            let Some(token) = connector
                .get("token")
                .or_else(|| connector.get("apiKey"))
                .or_else(|| connector.get("bearer_token"))
                .and_then(Value::as_str)
            else {
                warn!(trigger_id = %trigger.id, "social connector has no bearer token");
                continue;
            };

            let Some(user_id) = config.get("userId").and_then(Value::as_str) else {
                warn!(trigger_id = %trigger.id, "social-post trigger has no userId");
                continue;
            };

            let watch = config.get("watch").and_then(Value::as_str).unwrap_or("both");
            let keywords = parse_keywords(config);

            if watch == "posts" || watch == "both" {
                let since = state.last_post_id.clone();
                match self.social.user_posts(token, user_id, since.as_deref()).await {
                    Ok(posts) => {
                        created += submit_posts(
                            &self.queue,
                            workflow.id,
                            trigger.id,
                            "post",
                            &posts,
                            &keywords,
                            &mut state.last_post_id,
                        );
                    }
                    Err(err) => warn!(trigger_id = %trigger.id, "timeline fetch failed: {err}"),
                }
            }
            if watch == "mentions" || watch == "both" {
                let since = state.last_mention_id.clone();
                match self.social.mentions(token, user_id, since.as_deref()).await {
                    Ok(posts) => {
                        created += submit_posts(
                            &self.queue,
                            workflow.id,
                            trigger.id,
                            "mention",
                            &posts,
                            &keywords,
                            &mut state.last_mention_id,
                        );
                    }
                    Err(err) => warn!(trigger_id = %trigger.id, "mentions fetch failed: {err}"),
                }
            }
        }
        created
    }
}

/// Submit surviving posts and advance the watermark.  The watermark moves
/// past filtered posts too: a keyword miss is consumed, not retried.
fn submit_posts(
    queue: &JobQueue,
    workflow_id: Uuid,
    trigger_id: Uuid,
    event_type: &str,
    posts: &[SocialPost],
    keywords: &[String],
    watermark: &mut Option<String>,
) -> usize {
    let mut created = 0;
    for post in posts {
        *watermark = Some(post.id.clone());
        if !keyword_match(post, keywords) {
            continue;
        }
        let payload = json!({ "eventType": event_type, "post": post.raw });
        match queue.create_run(workflow_id, Some(trigger_id), payload) {
            Ok(run) => {
                info!(run_id = %run.id, post_id = %post.id, event_type, "social post matched");
                created += 1;
            }
            Err(err) => warn!("social run submission failed: {err}"),
        }
    }
    created
}
