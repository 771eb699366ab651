//! Social-feed client.
//!
//! Poll supervisors fetch a user's own posts and mentions since a watermark
//! post id.  The bearer token comes from the trigger's connector, so it is
//! a per-call argument rather than client state.

use async_trait::async_trait;
use serde_json::Value;

use crate::http::{build_client, check_status, env_var_or, DEFAULT_HTTP_TIMEOUT};
use crate::ClientError;

/// One post or mention from the feed.
#[derive(Debug, Clone)]
pub struct SocialPost {
    pub id: String,
    pub text: String,
    pub author_id: Option<String>,
    /// Full API object, passed through into run payloads.
    pub raw: Value,
}

#[async_trait]
pub trait SocialFeed: Send + Sync {
    /// The user's own posts newer than `since_id`, oldest first.
    async fn user_posts(
        &self,
        token: &str,
        user_id: &str,
        since_id: Option<&str>,
    ) -> Result<Vec<SocialPost>, ClientError>;

    /// Mentions of the user newer than `since_id`, oldest first.
    async fn mentions(
        &self,
        token: &str,
        user_id: &str,
        since_id: Option<&str>,
    ) -> Result<Vec<SocialPost>, ClientError>;
}

#[derive(Debug, Clone)]
pub struct SocialConfig {
    pub base_url: String,
}

impl SocialConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: env_var_or("SOCIAL_API_BASE_URL", "https://api.x.com"),
        }
    }
}

pub struct SocialApiClient {
    http: reqwest::Client,
    config: SocialConfig,
}

impl SocialApiClient {
    pub fn new(config: SocialConfig) -> Self {
        Self {
            http: build_client(DEFAULT_HTTP_TIMEOUT),
            config,
        }
    }

    async fn fetch_posts(
        &self,
        token: &str,
        url: &str,
        since_id: Option<&str>,
    ) -> Result<Vec<SocialPost>, ClientError> {
        let mut request = self.http.get(url).bearer_auth(token);
        if let Some(since) = since_id {
            request = request.query(&[("since_id", since)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ClientError::from_reqwest(e, DEFAULT_HTTP_TIMEOUT))?;
        let body: Value = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::Protocol(e.to_string()))?;

        let mut posts: Vec<SocialPost> = body
            .get("data")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        Some(SocialPost {
                            id: item.get("id")?.as_str()?.to_owned(),
                            text: item
                                .get("text")
                                .and_then(Value::as_str)
                                .unwrap_or_default()
                                .to_owned(),
                            author_id: item
                                .get("author_id")
                                .and_then(Value::as_str)
                                .map(str::to_owned),
                            raw: item.clone(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        // The API reports newest first; watermarking wants oldest first.
        posts.reverse();
        Ok(posts)
    }
}

#[async_trait]
impl SocialFeed for SocialApiClient {
    async fn user_posts(
        &self,
        token: &str,
        user_id: &str,
        since_id: Option<&str>,
    ) -> Result<Vec<SocialPost>, ClientError> {
        let url = format!("{}/2/users/{user_id}/tweets", self.config.base_url);
        self.fetch_posts(token, &url, since_id).await
    }

    async fn mentions(
        &self,
        token: &str,
        user_id: &str,
        since_id: Option<&str>,
    ) -> Result<Vec<SocialPost>, ClientError> {
        let url = format!("{}/2/users/{user_id}/mentions", self.config.base_url);
        self.fetch_posts(token, &url, since_id).await
    }
}
