use std::{future::Future, time::Duration};

use rand::Rng;
use tracing::{debug, warn};

use crate::payload::PayloadError;

pub mod exchange_rates;
pub mod reports;

pub use exchange_rates::{ExchangeRatesClient, EXCHANGE_RATE_API_URL};
pub use reports::{load_report_dir, ReportFile};

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("Http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected response shape: {0}")]
    UnexpectedResponse(String),

    #[error("Upstream reported failure: {0}")]
    Upstream(String),

    #[error("Gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("{0}")]
    Payload(#[from] PayloadError),

    #[error("Could not read report directory: {0}")]
    Io(#[from] std::io::Error),
}

/// Bounded exponential backoff with jitter. Shared by the HTTP fetchers and
/// the report poll loop.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry following `attempt` (zero-based), doubled each
    /// attempt, capped at `max_delay`, with up to 25% jitter on top.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponential = self.base_delay.saturating_mul(2u32.saturating_pow(attempt));
        let capped = exponential.min(self.max_delay);
        let jitter = rand::rng().random_range(0.0..=0.25);
        capped.mul_f64(1.0 + jitter)
    }
}

/// One observation of an asynchronous report.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportPoll<T> {
    Ready(T),
    Pending,
    Failed(String),
}

/// Polls until the report is ready, the upstream declares it dead, or the
/// attempt budget runs out. Never recurses and never sleeps past
/// `policy.max_delay` per step.
pub async fn poll_until_ready<T, F, Fut>(policy: &RetryPolicy, mut poll: F) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<ReportPoll<T>, FetchError>>,
{
    let mut last_error = "report never became ready".to_string();

    for attempt in 0..policy.max_attempts {
        match poll().await {
            Ok(ReportPoll::Ready(data)) => return Ok(data),
            Ok(ReportPoll::Pending) => {
                debug!("Report pending on attempt {}", attempt + 1);
            }
            Ok(ReportPoll::Failed(reason)) => return Err(FetchError::Upstream(reason)),
            Err(e) => {
                warn!("Report poll attempt {} failed: {}", attempt + 1, e);
                last_error = e.to_string();
            }
        }

        if attempt + 1 < policy.max_attempts {
            tokio::time::sleep(policy.delay_for(attempt)).await;
        }
    }

    Err(FetchError::RetriesExhausted { attempts: policy.max_attempts, last_error })
}

/// Runs a fallible operation under the retry policy.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut last_error = String::new();

    for attempt in 0..policy.max_attempts {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                warn!("Attempt {} failed: {}", attempt + 1, e);
                last_error = e.to_string();
            }
        }

        if attempt + 1 < policy.max_attempts {
            tokio::time::sleep(policy.delay_for(attempt)).await;
        }
    }

    Err(FetchError::RetriesExhausted { attempts: policy.max_attempts, last_error })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn instant_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy { max_attempts, base_delay: Duration::ZERO, max_delay: Duration::ZERO }
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(300),
        };

        let first = policy.delay_for(0);
        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(125));

        let second = policy.delay_for(1);
        assert!(second >= Duration::from_millis(200) && second <= Duration::from_millis(250));

        // capped before jitter
        let deep = policy.delay_for(10);
        assert!(deep <= Duration::from_millis(375));
    }

    #[tokio::test]
    async fn test_poll_returns_once_ready() {
        let calls = Cell::new(0u32);
        let result = poll_until_ready(&instant_policy(5), || {
            calls.set(calls.get() + 1);
            let call = calls.get();
            async move {
                if call >= 3 {
                    Ok(ReportPoll::Ready("document-id"))
                } else {
                    Ok(ReportPoll::Pending)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "document-id");
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn test_poll_is_bounded() {
        let calls = Cell::new(0u32);
        let result: Result<(), FetchError> = poll_until_ready(&instant_policy(4), || {
            calls.set(calls.get() + 1);
            async { Ok(ReportPoll::Pending) }
        })
        .await;

        assert!(matches!(result, Err(FetchError::RetriesExhausted { attempts: 4, .. })));
        assert_eq!(calls.get(), 4);
    }

    #[tokio::test]
    async fn test_poll_stops_on_upstream_failure() {
        let calls = Cell::new(0u32);
        let result: Result<(), FetchError> = poll_until_ready(&instant_policy(5), || {
            calls.set(calls.get() + 1);
            async { Ok(ReportPoll::Failed("CANCELLED".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(FetchError::Upstream(reason)) if reason == "CANCELLED"));
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn test_with_retry_recovers() {
        let calls = Cell::new(0u32);
        let result = with_retry(&instant_policy(3), || {
            calls.set(calls.get() + 1);
            let call = calls.get();
            async move {
                if call >= 2 {
                    Ok(call)
                } else {
                    Err(FetchError::Upstream("transient".to_string()))
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
    }
}
