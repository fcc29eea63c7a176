//! HTTP client for search providers
//!
//! Builds the shared reqwest client and wraps provider calls in a bounded
//! retry loop with exponential backoff and jitter.

use std::future::Future;
use std::time::Duration;

use fitrank_core::ErrorCode;
use rand::Rng;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Search layer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Providers to query, in preference order ("serper", "brave")
    pub providers: Vec<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Maximum retries per request
    pub max_retries: u32,
    /// Base delay of the exponential backoff
    pub backoff_base_ms: u64,
    /// Maximum planned queries per run
    pub max_queries: usize,
    /// Concurrent provider requests
    pub max_concurrent: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            providers: vec!["serper".to_string(), "brave".to_string()],
            timeout_secs: 15,
            max_retries: 3,
            backoff_base_ms: 300,
            max_queries: 4,
            max_concurrent: 4,
        }
    }
}

/// Errors from search collaborators
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{provider} returned status {status}")]
    Status { provider: String, status: u16 },

    #[error("{0} rate limit exceeded")]
    RateLimited(String),

    #[error("Failed to decode {provider} response: {message}")]
    Decode { provider: String, message: String },

    #[error("Missing API key: {0}")]
    MissingApiKey(&'static str),

    #[error("No search provider configured")]
    NoProvider,

    #[error("All providers failed: {0}")]
    AllFailed(String),
}

impl SearchError {
    pub fn code(&self) -> ErrorCode {
        match self {
            SearchError::RateLimited(_) => ErrorCode::RateLimitExceeded,
            SearchError::Request(e) if e.is_timeout() => ErrorCode::TimeoutError,
            _ => ErrorCode::ServiceUnavailable,
        }
    }

    /// Whether another attempt may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            SearchError::Request(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            SearchError::Status { status, .. } => *status >= 500,
            SearchError::RateLimited(_) => true,
            _ => false,
        }
    }

    /// Map a non-success HTTP status to an error
    pub fn from_status(provider: &str, status: StatusCode) -> Self {
        if status == StatusCode::TOO_MANY_REQUESTS {
            SearchError::RateLimited(provider.to_string())
        } else {
            SearchError::Status {
                provider: provider.to_string(),
                status: status.as_u16(),
            }
        }
    }
}

const USER_AGENT: &str = concat!("fitrank/", env!("CARGO_PKG_VERSION"));

/// Create the HTTP client shared by a provider
pub fn create_http_client(config: &SearchConfig) -> Result<Client, SearchError> {
    Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| SearchError::ClientBuild(e.to_string()))
}

/// Delay before retry `attempt` (1-based): base * 2^(attempt-1) plus up to 50% jitter
pub fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    let exp = base_ms.saturating_mul(1u64 << attempt.saturating_sub(1).min(16));
    let jitter = if exp > 0 {
        rand::thread_rng().gen_range(0..=exp / 2)
    } else {
        0
    };
    Duration::from_millis(exp + jitter)
}

/// Run `op`, retrying transient failures up to `config.max_retries` times
pub async fn with_retry<T, F, Fut>(config: &SearchConfig, label: &str, mut op: F) -> Result<T, SearchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SearchError>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < config.max_retries => {
                attempt += 1;
                let delay = backoff_delay(config.backoff_base_ms, attempt);
                warn!(
                    "{} failed (attempt {}/{}): {}; retrying in {:?}",
                    label, attempt, config.max_retries, e, delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                debug!("{} giving up after {} retries: {}", label, attempt, e);
                return Err(e);
            }
        }
    }
}
