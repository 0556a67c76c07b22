//! Moltbook publishing
//!
//! Sends the composed commentary to the Moltbook agent network, or only logs
//! it when running dry.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

use super::traits::{PostRequest, SocialPlatform};
use crate::config::PublisherConfig;
use crate::error::{GopherError, PublishError, Result};

/// Moltbook API client
pub struct MoltbookClient {
    client: Client,
    base_url: String,
    submolt: String,
    api_key: Zeroizing<String>,
}

#[derive(Serialize)]
struct CreatePost<'a> {
    submolt: &'a str,
    title: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct CreatePostResponse {
    #[serde(default)]
    post: Option<PostBody>,
    #[serde(default)]
    id: Option<String>,
}

#[derive(Deserialize)]
struct PostBody {
    id: String,
}

impl MoltbookClient {
    pub fn new(config: &PublisherConfig, api_key: Zeroizing<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| GopherError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        info!("Moltbook publishing enabled (submolt: {})", config.submolt);
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            submolt: config.submolt.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl SocialPlatform for MoltbookClient {
    async fn create_post(&self, request: &PostRequest) -> std::result::Result<String, PublishError> {
        let body = CreatePost {
            submolt: &self.submolt,
            title: &request.title,
            content: &request.content,
        };

        let response = self
            .client
            .post(format!("{}/posts", self.base_url))
            .bearer_auth(self.api_key.as_str())
            .header("Idempotency-Key", &request.idempotency_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("Moltbook request failed: {}", e);
                PublishError::Transient(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!("Moltbook post failed: {} - {}", status, text);
            return Err(classify_status(status, text));
        }

        // A 2xx is final: the post is live
        let post_id = match response.json::<CreatePostResponse>().await {
            Ok(parsed) => parsed.post.map(|p| p.id).or(parsed.id),
            Err(e) => {
                warn!("Unreadable Moltbook response for accepted post: {}", e);
                None
            }
        };
        let post_id = post_id.unwrap_or_else(|| {
            warn!(
                idempotency_key = %request.idempotency_key,
                "Moltbook accepted the post without an id"
            );
            unconfirmed_post_id(&request.idempotency_key)
        });

        debug!("Moltbook post created: {}", post_id);
        Ok(post_id)
    }
}

/// Stand-in id for a post the platform accepted without naming it
fn unconfirmed_post_id(idempotency_key: &str) -> String {
    format!("unconfirmed-{}", idempotency_key)
}

fn classify_status(status: StatusCode, body: String) -> PublishError {
    // 429 is the one-post-per-30-minutes limit
    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        PublishError::Transient(format!("HTTP {}: {}", status, body))
    } else {
        PublishError::Rejected(format!("HTTP {}: {}", status, body))
    }
}

/// Publishes to the log only
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunPlatform;

#[async_trait]
impl SocialPlatform for DryRunPlatform {
    async fn create_post(&self, request: &PostRequest) -> std::result::Result<String, PublishError> {
        let post_id = format!("dry-run-{}", uuid::Uuid::new_v4());
        info!(
            post_id = %post_id,
            idempotency_key = %request.idempotency_key,
            "MOLTBOOK POST (dry run): {}\n{}",
            request.title,
            request.content
        );
        Ok(post_id)
    }
}
