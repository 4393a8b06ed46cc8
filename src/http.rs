//! JSON-over-HTTP calls to remote model providers.
//!
//! All remote backends (OpenAI-compatible embeddings and chat, Ollama
//! generation and guard models) go through [`post_json_with_retry`], which
//! applies one retry policy and one error classification:
//!
//! | Outcome | Result |
//! |---------|--------|
//! | 2xx with a JSON body | `Ok(body)` |
//! | 2xx with an unparsable body | [`RagError::Provider`] |
//! | 401 / 403 | [`RagError::Auth`], no retry |
//! | 429 / 5xx / connection failure | retry, then [`RagError::Network`] |
//! | other 4xx | [`RagError::Provider`], no retry |
//!
//! Backoff doubles from the base delay per attempt: 1s, 2s, 4s, 8s, 16s,
//! 32s with the default base, capped at `base × 2^5`.

use std::time::Duration;

use ragtrace_core::RagError;
use reqwest::StatusCode;
use tracing::{debug, warn};

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Fail on the first error.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        self.base_delay
            .checked_mul(1u32 << (attempt - 1).min(5))
            .unwrap_or(Duration::MAX)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(1))
    }
}

/// Build a client with a per-request timeout.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client, RagError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| RagError::config(format!("failed to build HTTP client: {}", e)))
}

/// POST `body` to `url` and return the decoded JSON response.
///
/// `provider` names the backend in errors and logs. `bearer` is sent as an
/// `Authorization: Bearer` header when present.
pub async fn post_json_with_retry(
    client: &reqwest::Client,
    provider: &str,
    url: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
    policy: &RetryPolicy,
) -> Result<serde_json::Value, RagError> {
    let mut last_err = String::new();

    for attempt in 0..=policy.max_retries {
        if attempt > 0 {
            let delay = policy.delay_for(attempt);
            warn!(
                provider,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %last_err,
                "retrying provider request"
            );
            tokio::time::sleep(delay).await;
        }

        let mut request = client.post(url).json(body);
        if let Some(key) = bearer {
            request = request.bearer_auth(key);
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                last_err = format!("request to {} failed: {}", url, e);
                continue;
            }
        };

        let status = response.status();
        if status.is_success() {
            debug!(provider, %status, "provider request succeeded");
            return response
                .json::<serde_json::Value>()
                .await
                .map_err(|e| RagError::Provider {
                    provider: provider.to_string(),
                    message: format!("invalid JSON response: {}", e),
                });
        }

        let body_text = response.text().await.unwrap_or_default();
        let message = format!("{} {}", status, body_text.trim());

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(RagError::Auth {
                provider: provider.to_string(),
                message,
            });
        }

        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            last_err = message;
            continue;
        }

        return Err(RagError::Provider {
            provider: provider.to_string(),
            message,
        });
    }

    Err(RagError::Network {
        provider: provider.to_string(),
        message: format!(
            "giving up after {} attempt(s): {}",
            policy.max_retries + 1,
            last_err
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let p = RetryPolicy::default();
        assert_eq!(p.delay_for(0), Duration::ZERO);
        assert_eq!(p.delay_for(1), Duration::from_secs(1));
        assert_eq!(p.delay_for(2), Duration::from_secs(2));
        assert_eq!(p.delay_for(4), Duration::from_secs(8));
        assert_eq!(p.delay_for(6), Duration::from_secs(32));
        assert_eq!(p.delay_for(9), Duration::from_secs(32));
    }

    #[test]
    fn test_backoff_saturates() {
        let p = RetryPolicy::new(3, Duration::from_millis(u64::MAX));
        assert_eq!(p.delay_for(1), Duration::from_millis(u64::MAX));
        assert_eq!(p.delay_for(6), Duration::MAX);
    }
}
