//! `triggers` crate — supervisors that turn external events into runs.
//!
//! Each supervisor is an independent periodic task owning its private
//! dedup/watermark state.  They share nothing but the store and the queue,
//! and all stop on the same shutdown signal.

pub mod chain_watch;
pub mod http_poll;
pub mod keepalive;
pub mod schedule;
pub mod social_poll;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use clients::{ChainRpc, SocialFeed};
use queue::JobQueue;
use store::{SecretBox, Store};

pub use chain_watch::ChainWatcher;
pub use http_poll::HttpPoller;
pub use keepalive::KeepAlive;
pub use schedule::ScheduleRunner;
pub use social_poll::SocialPoller;

/// Scan cadences.  Per-trigger cadences are honoured on top of these.
pub const SCHEDULE_INTERVAL: Duration = Duration::from_secs(30);
pub const CHAIN_WATCH_INTERVAL: Duration = Duration::from_secs(30);
pub const HTTP_POLL_INTERVAL: Duration = Duration::from_secs(30);
pub const SOCIAL_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Spawn every supervisor.  The returned handles finish once `shutdown`
/// flips to `true`.
pub fn spawn_all(
    store: Store,
    queue: JobQueue,
    secret_box: SecretBox,
    chain: Arc<dyn ChainRpc>,
    social: Arc<dyn SocialFeed>,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    let mut handles = vec![
        tokio::spawn(
            ScheduleRunner::new(store.clone(), queue.clone()).run(shutdown.clone()),
        ),
        tokio::spawn(
            ChainWatcher::new(store.clone(), queue.clone(), chain).run(shutdown.clone()),
        ),
        tokio::spawn(
            HttpPoller::new(store.clone(), queue.clone(), secret_box.clone())
                .run(shutdown.clone()),
        ),
        tokio::spawn(SocialPoller::new(store, queue, secret_box, social).run(shutdown.clone())),
    ];

    if let Some(keepalive) = KeepAlive::from_env() {
        handles.push(tokio::spawn(keepalive.run(shutdown)));
    }

    handles
}
