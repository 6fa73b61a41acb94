use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::warn;

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_BACKOFF_MS: u64 = 2000;
const REQUEST_TIMEOUT_SECS: u64 = 30;

pub type FetchResult<T> = std::result::Result<T, FetchError>;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("content API error (status {status}): {message}")]
    Api { status: u16, message: String },
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Network(err.to_string())
    }
}

/// Client for a Browserless-compatible `/content` endpoint: the target page
/// is rendered in a real browser and the settled DOM comes back as HTML.
pub struct PageFetcher {
    client: reqwest::Client,
    endpoint: String,
}

impl PageFetcher {
    /// Build from `BROWSERLESS_URL` and optional `BROWSERLESS_TOKEN`.
    pub fn from_env() -> anyhow::Result<Self> {
        let base = std::env::var("BROWSERLESS_URL")
            .map_err(|_| anyhow::anyhow!("BROWSERLESS_URL environment variable must be set"))?;
        let token = std::env::var("BROWSERLESS_TOKEN").ok();
        Ok(Self::new(&base, token.as_deref()))
    }

    pub fn new(base_url: &str, token: Option<&str>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build HTTP client");

        let mut endpoint = format!("{}/content", base_url.trim_end_matches('/'));
        if let Some(token) = token {
            endpoint.push_str(&format!("?token={}", token));
        }

        Self { client, endpoint }
    }

    /// Fetch the fully-rendered HTML for one URL.
    pub async fn content(&self, url: &str) -> FetchResult<String> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "url": url }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(FetchError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp.text().await?)
    }
}

/// Minimum spacing between outbound requests. Explicit caller-owned state
/// rather than hidden per-function timestamps.
pub struct RateLimiter {
    min_delay: Duration,
    last: Option<Instant>,
}

impl RateLimiter {
    pub fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            last: None,
        }
    }

    /// Sleep until at least `min_delay` has passed since the previous call.
    pub async fn wait(&mut self) {
        if let Some(last) = self.last {
            let elapsed = last.elapsed();
            if elapsed < self.min_delay {
                tokio::time::sleep(self.min_delay - elapsed).await;
            }
        }
        self.last = Some(Instant::now());
    }
}

/// Retry schedule for transient fetch failures.
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_backoff: Duration::from_millis(DEFAULT_BACKOFF_MS),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        self.base_backoff * 2u32.pow(attempt)
    }
}

/// Fetch one page, retrying on network errors and 429/5xx statuses with
/// exponential backoff.
pub async fn fetch_with_retry(
    fetcher: &PageFetcher,
    policy: &RetryPolicy,
    url: &str,
) -> FetchResult<String> {
    let mut attempt = 0;
    loop {
        match fetcher.content(url).await {
            Ok(html) => return Ok(html),
            Err(e) if attempt < policy.max_retries && is_transient(&e) => {
                let backoff = policy.backoff(attempt);
                attempt += 1;
                warn!(
                    "Retry {}/{} for {} after error: {} (backing off {:.1}s)",
                    attempt,
                    policy.max_retries,
                    url,
                    e,
                    backoff.as_secs_f64()
                );
                tokio::time::sleep(backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
}

fn is_transient(err: &FetchError) -> bool {
    match err {
        FetchError::Network(_) => true,
        FetchError::Api { status, .. } => *status == 429 || *status >= 500,
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(is_transient(&FetchError::Network("timeout".into())));
        assert!(is_transient(&FetchError::Api {
            status: 429,
            message: String::new()
        }));
        assert!(is_transient(&FetchError::Api {
            status: 503,
            message: String::new()
        }));
        assert!(!is_transient(&FetchError::Api {
            status: 404,
            message: String::new()
        }));
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_backoff: Duration::from_millis(100),
        };
        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
    }

    #[test]
    fn endpoint_includes_token() {
        let fetcher = PageFetcher::new("http://localhost:3000/", Some("secret"));
        assert_eq!(fetcher.endpoint, "http://localhost:3000/content?token=secret");
        let bare = PageFetcher::new("http://localhost:3000", None);
        assert_eq!(bare.endpoint, "http://localhost:3000/content");
    }

    #[tokio::test]
    async fn rate_limiter_spaces_calls() {
        let mut limiter = RateLimiter::new(Duration::from_millis(50));
        limiter.wait().await;
        let start = Instant::now();
        limiter.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(45));
    }
}
