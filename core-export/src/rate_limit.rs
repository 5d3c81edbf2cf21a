//! Rate-limit aware request execution.
//!
//! Every platform call made while processing a job goes through
//! [`RateLimitedClient::execute`]. A 429 response is retried with
//! exponential backoff until the retry budget is spent; any other response is
//! handed back to the caller untouched.

use crate::{ExportConfig, ExportError, ProgressReporter, Result};
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use std::sync::Arc;
use std::time::Duration;
use tracing::{instrument, warn};

/// Retry budget and backoff growth for rate-limited responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub max_retries: u32,
    pub base_backoff: Duration,
}

impl BackoffPolicy {
    pub fn new(max_retries: u32, base_backoff: Duration) -> Self {
        Self {
            max_retries,
            base_backoff,
        }
    }

    pub fn from_config(config: &ExportConfig) -> Self {
        Self::new(config.max_retries, config.base_backoff)
    }

    /// `max(suggested, base * 2^retry_count)`
    pub fn backoff_for(&self, retry_count: u32, suggested: Option<Duration>) -> Duration {
        let exponential = self
            .base_backoff
            .saturating_mul(2u32.saturating_pow(retry_count));
        suggested.map_or(exponential, |hint| hint.max(exponential))
    }
}

/// Wraps an [`HttpClient`] with rate-limit retries.
#[derive(Clone)]
pub struct RateLimitedClient {
    http: Arc<dyn HttpClient>,
    policy: BackoffPolicy,
}

impl RateLimitedClient {
    pub fn new(http: Arc<dyn HttpClient>, policy: BackoffPolicy) -> Self {
        Self { http, policy }
    }

    /// Issue `request`, retrying while the platform answers 429.
    ///
    /// Before each sleep the retry count, next retry time and step are
    /// persisted through `reporter`.
    ///
    /// # Errors
    ///
    /// - [`ExportError::MaxRetriesExceeded`] once `max_retries` retries were
    ///   all rate limited. This is fatal to the job.
    /// - [`ExportError::Transport`] if the request could not be sent.
    #[instrument(skip(self, request, reporter), fields(job_id = %reporter.job_id(), url = %request.url))]
    pub async fn execute(
        &self,
        request: HttpRequest,
        reporter: &ProgressReporter,
    ) -> Result<HttpResponse> {
        let mut retry_count = 0u32;

        loop {
            let response = self.http.execute(request.clone()).await?;
            if !response.is_rate_limited() {
                return Ok(response);
            }

            if retry_count >= self.policy.max_retries {
                warn!(retry_count, "Rate limit retries exhausted");
                return Err(ExportError::MaxRetriesExceeded {
                    attempts: retry_count + 1,
                });
            }

            let backoff = self.policy.backoff_for(retry_count, response.retry_after());
            warn!(
                retry_count = retry_count + 1,
                backoff_ms = backoff.as_millis() as u64,
                "Rate limited, backing off"
            );

            reporter.record_rate_limit(retry_count + 1, backoff).await?;
            tokio::time::sleep(backoff).await;
            retry_count += 1;
        }
    }
}
