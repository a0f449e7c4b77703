//! JSON-over-HTTP helper shared by the embedding and chat providers.
//!
//! # Retry strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors and timeouts → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use serde_json::Value;
use std::time::Duration;

use support_desk_core::{DeskError, Result};

pub fn client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(DeskError::provider)
}

/// POST `body` to `url` and decode the JSON reply, retrying transient
/// failures up to `max_retries` times.
pub async fn post_json(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &Value,
    max_retries: u32,
) -> Result<Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tracing::debug!(url, attempt, ?delay, "retrying provider request");
            tokio::time::sleep(delay).await;
        }

        let mut request = client.post(url).json(body);
        if let Some(key) = bearer {
            request = request.bearer_auth(key);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response
                        .json()
                        .await
                        .map_err(|e| DeskError::provider(format!("invalid response from {}: {}", url, e)));
                }

                let body_text = response.text().await.unwrap_or_default();
                let err = DeskError::provider(format!("{} returned {}: {}", url, status, body_text));
                if status.as_u16() == 429 || status.is_server_error() {
                    tracing::warn!(url, %status, "transient provider error");
                    last_err = Some(err);
                    continue;
                }
                return Err(err);
            }
            Err(e) => {
                tracing::warn!(url, error = %e, "provider request failed");
                last_err = Some(DeskError::provider(format!("request to {} failed: {}", url, e)));
            }
        }
    }

    Err(last_err.unwrap_or_else(|| DeskError::provider("request failed after retries")))
}

/// GET `url` and report whether it answered with a success status.
pub async fn reachable(client: &reqwest::Client, url: &str, bearer: Option<&str>) -> bool {
    let mut request = client.get(url);
    if let Some(key) = bearer {
        request = request.bearer_auth(key);
    }
    matches!(request.send().await, Ok(r) if r.status().is_success())
}
