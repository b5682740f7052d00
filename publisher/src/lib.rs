pub mod compose;
pub mod governor;

pub use compose::{compose_deal_post, MAX_POST_LEN};
pub use governor::{GovernorConfig, PublishGovernor};

use async_trait::async_trait;
use dealwatch_core::PublishError;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info, warn};

/// Outbound posting seam. The pipeline only ever needs "send this text,
/// give me the post id back".
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, text: &str) -> Result<String, PublishError>;
}

#[derive(Debug, Serialize)]
struct PostRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct PostResponse {
    id: String,
}

/// HTTP publisher posting to the social target's REST endpoint with a
/// bearer token.
#[derive(Debug)]
pub struct HttpPublisher {
    http_client: Client,
    base_url: String,
    token: String,
}

impl HttpPublisher {
    pub fn new(base_url: String, token: String) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http_client,
            base_url,
            token,
        }
    }
}

#[async_trait]
impl Publisher for HttpPublisher {
    async fn publish(&self, text: &str) -> Result<String, PublishError> {
        let url = format!("{}/v1/posts", self.base_url);

        let result = self
            .http_client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&PostRequest { text })
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                error!("post transport failure: {}", e);
                if e.is_timeout() {
                    return Err(PublishError::RequestTimeout);
                }
                return Err(PublishError::Transport {
                    details: e.to_string(),
                });
            }
        };

        let status = response.status();
        if status.is_success() {
            let posted: PostResponse =
                response.json().await.map_err(|e| PublishError::Transport {
                    details: format!("failed to parse post response: {}", e),
                })?;
            info!("post {} accepted", posted.id);
            return Ok(posted.id);
        }

        error!("post rejected with status {}", status);
        match status {
            StatusCode::UNAUTHORIZED => Err(PublishError::AuthenticationFailed {
                reason: "bearer token rejected".to_string(),
            }),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(900);
                warn!("posting quota exceeded, retry after {}s", retry_after);
                Err(PublishError::QuotaExceeded { retry_after })
            }
            StatusCode::FORBIDDEN | StatusCode::UNPROCESSABLE_ENTITY => {
                let reason = response.text().await.unwrap_or_default();
                Err(PublishError::Rejected { reason })
            }
            s if s.is_server_error() => Err(PublishError::ServerError {
                status_code: s.as_u16(),
            }),
            s => Err(PublishError::Rejected {
                reason: format!("unexpected status {}", s),
            }),
        }
    }
}
