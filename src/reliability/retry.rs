//! Backoff retries for operations that lose a race with another process.
//!
//! The supervisor's bind path is the main user: a port handed out by the
//! allocator can be taken before the node binds it, in which case a fresh port
//! is allocated and the start is attempted again after a short pause.

use std::future::Future;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use tracing::warn;

/// How often and how patiently to retry.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub retries: u32,
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub factor: f32,
}

impl RetryPolicy {
    /// Policy for re-binding after a port conflict: `retries` extra attempts,
    /// 10ms doubling up to 200ms.
    #[must_use]
    pub fn bind(retries: u32) -> Self {
        Self {
            retries,
            min_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(200),
            factor: 2.0,
        }
    }

    /// Policy that fails on the first error.
    #[must_use]
    pub fn none() -> Self {
        Self::bind(0)
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.retries as usize)
            .with_factor(self.factor)
            .with_jitter()
    }
}

/// Run `operation` until it succeeds, returns an error `should_retry`
/// rejects, or the policy runs out of attempts. The last error is returned.
pub async fn retry_async<F, Fut, T, E, R>(
    policy: RetryPolicy,
    operation: F,
    should_retry: R,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    R: Fn(&E) -> bool,
{
    let retries = policy.retries;
    let mut attempt = 0u32;

    operation
        .retry(policy.backoff())
        .when(move |e| should_retry(e))
        .notify(|err: &E, delay: Duration| {
            attempt += 1;
            warn!(
                attempt,
                retries,
                next_delay_ms = delay.as_millis() as u64,
                error = %err,
                "Attempt failed, retrying"
            );
        })
        .await
}
