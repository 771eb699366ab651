//! Shared reqwest plumbing for the service clients.

use std::time::Duration;

use crate::ClientError;

/// Default timeout for generic HTTP calls.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        // Builder only fails on TLS backend misconfiguration.
        .unwrap_or_default()
}

/// Map a non-success response onto a classified [`ClientError`].
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();
    if status.as_u16() == 401 || status.as_u16() == 403 {
        return Err(ClientError::Unauthenticated(message));
    }
    Err(ClientError::Http {
        status: status.as_u16(),
        message,
    })
}

pub(crate) fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

pub(crate) fn env_var_or(key: &str, default: &str) -> String {
    env_var(key).unwrap_or_else(|| default.to_owned())
}
