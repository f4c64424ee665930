//! Rate-limited HTTP client
//!
//! Every page request in the process goes through one [`HttpClient`]. A
//! counting semaphore bounds how many fetches are in flight against the
//! remote site; each fetch waits a short random delay before its first
//! request and retries transport errors, 429 and 5xx responses with
//! exponential backoff.

use parlay_common::{ParlayError, Result};
use rand::Rng;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

pub const USER_AGENT: &str = "Mozilla/5.0 (parlay-updater)";

const DEFAULT_CONCURRENCY: usize = 4;
const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_INITIAL_BACKOFF_MS: u64 = 500;
const DEFAULT_JITTER_MIN_MS: u64 = 100;
const DEFAULT_JITTER_MAX_MS: u64 = 300;

/// Tuning knobs for [`HttpClient`]
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Permits in the process-wide admission gate
    pub concurrency: usize,
    /// Attempts per fetch, including the first
    pub max_attempts: u32,
    pub timeout: Duration,
    /// Delay before the second attempt; doubles after each retry
    pub initial_backoff: Duration,
    pub jitter_min: Duration,
    pub jitter_max: Duration,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            initial_backoff: Duration::from_millis(DEFAULT_INITIAL_BACKOFF_MS),
            jitter_min: Duration::from_millis(DEFAULT_JITTER_MIN_MS),
            jitter_max: Duration::from_millis(DEFAULT_JITTER_MAX_MS),
        }
    }
}

impl HttpClientConfig {
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(ParlayError::Config("concurrency must be at least 1".into()));
        }
        if self.max_attempts == 0 {
            return Err(ParlayError::Config("max_attempts must be at least 1".into()));
        }
        if self.jitter_min > self.jitter_max {
            return Err(ParlayError::Config("jitter_min must not exceed jitter_max".into()));
        }
        Ok(())
    }
}

/// Outcome of a single request attempt that did not produce a body
enum AttemptError {
    Retryable(String),
    Fatal(String),
}

/// Shared fetcher with an admission gate, jitter and bounded retries.
///
/// Cloning is cheap and clones share the same gate.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    gate: Arc<Semaphore>,
    config: HttpClientConfig,
}

impl HttpClient {
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        config.validate()?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| ParlayError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            gate: Arc::new(Semaphore::new(config.concurrency)),
            config,
        })
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// Permits currently free in the admission gate
    pub fn available_permits(&self) -> usize {
        self.gate.available_permits()
    }

    /// GET `url` and return the body as text.
    ///
    /// The gate permit is held for the whole call, jitter and retries
    /// included. Exhausted or non-retryable failures surface as
    /// [`ParlayError::TransientFetch`].
    pub async fn get_text(&self, url: &str) -> Result<String> {
        let _permit = self.gate.acquire().await.map_err(|_| ParlayError::TransientFetch {
            url: url.to_string(),
            attempts: 0,
            message: "admission gate closed".to_string(),
        })?;

        self.jitter().await;

        let max_attempts = self.config.max_attempts;
        let mut backoff = self.config.initial_backoff;
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            match self.attempt(url).await {
                Ok(body) => {
                    debug!(url, attempt, bytes = body.len(), "Fetched page");
                    return Ok(body);
                },
                Err(AttemptError::Fatal(message)) => {
                    warn!(url, attempt, error = %message, "Fetch failed, not retrying");
                    return Err(ParlayError::TransientFetch {
                        url: url.to_string(),
                        attempts: attempt,
                        message,
                    });
                },
                Err(AttemptError::Retryable(message)) => {
                    warn!(url, attempt, max_attempts, error = %message, "Fetch attempt failed");
                    last_error = message;

                    if attempt < max_attempts {
                        tokio::time::sleep(backoff).await;
                        backoff = backoff.saturating_mul(2);
                    }
                },
            }
        }

        Err(ParlayError::TransientFetch {
            url: url.to_string(),
            attempts: max_attempts,
            message: last_error,
        })
    }

    async fn attempt(&self, url: &str) -> std::result::Result<String, AttemptError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AttemptError::Retryable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = format!("HTTP {}", status);
            return Err(if is_retryable(status) {
                AttemptError::Retryable(message)
            } else {
                AttemptError::Fatal(message)
            });
        }

        response.text().await.map_err(|e| AttemptError::Retryable(e.to_string()))
    }

    async fn jitter(&self) {
        let min = self.config.jitter_min.as_millis() as u64;
        let max = self.config.jitter_max.as_millis() as u64;
        if max == 0 {
            return;
        }
        let wait = rand::thread_rng().gen_range(min..=max);
        tokio::time::sleep(Duration::from_millis(wait)).await;
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}
