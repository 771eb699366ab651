//! Keep-alive pinger.
//!
//! Free-tier hosts idle out processes that receive no traffic; when
//! `PUBLIC_URL` is configured the pinger requests its own health endpoint
//! on an interval to stay warm.

use std::time::Duration;

use tokio::sync::watch;
use tracing::debug;

const DEFAULT_INTERVAL_MS: u64 = 300_000;

pub struct KeepAlive {
    url: String,
    interval: Duration,
    http: reqwest::Client,
}

impl KeepAlive {
    /// Built only when `PUBLIC_URL` is set.
    pub fn from_env() -> Option<Self> {
        let public_url = std::env::var("PUBLIC_URL").ok().filter(|v| !v.is_empty())?;
        let interval = std::env::var("KEEP_ALIVE_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_INTERVAL_MS);

        Some(Self {
            url: format!("{}/healthz", public_url.trim_end_matches('/')),
            interval: Duration::from_millis(interval),
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
        })
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.http.get(&self.url).send().await {
                        Ok(response) => debug!(status = %response.status(), "keep-alive ping"),
                        Err(err) => debug!("keep-alive ping failed: {err}"),
                    }
                }
                _ = shutdown.changed() => if *shutdown.borrow() { return },
            }
        }
    }
}
