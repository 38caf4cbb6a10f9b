use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::{sleep, timeout};
use tracing::warn;

use crate::error::ProviderError;

/// Bounded exponential backoff applied to one identifier's provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Sleep before retry number `attempt + 1`: `base * 2^attempt`, capped at
    /// `max_delay`, then scaled by a random factor in `[0.5, 1.0]`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt.min(16)));
        let capped = exp.min(self.max_delay);
        let factor: f64 = rand::thread_rng().gen_range(0.5..=1.0);
        capped.mul_f64(factor)
    }
}

/// Run `op` under a per-attempt timeout, retrying retryable failures.
///
/// A timed out attempt counts as [`ProviderError::Timeout`].
pub async fn with_retry<T, F, Fut>(
    label: &str,
    policy: &RetryPolicy,
    attempt_timeout: Duration,
    mut op: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt: u32 = 0;
    loop {
        let outcome = match timeout(attempt_timeout, op()).await {
            Ok(res) => res,
            Err(_) => Err(ProviderError::Timeout(attempt_timeout)),
        };
        match outcome {
            Ok(v) => return Ok(v),
            Err(err) if err.is_retryable() && attempt < policy.max_retries => {
                let delay = policy.delay_for(attempt);
                attempt += 1;
                warn!(
                    identifier = label,
                    attempt,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "provider call failed; backing off"
                );
                sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    #[test]
    fn delay_grows_and_is_capped() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
        };
        for attempt in 0..10 {
            let d = policy.delay_for(attempt);
            let full = Duration::from_millis(100 * 2u64.pow(attempt)).min(Duration::from_secs(1));
            assert!(d <= full, "attempt {attempt}: {d:?} > {full:?}");
            assert!(d >= full / 2, "attempt {attempt}: {d:?} < half of {full:?}");
        }
        assert!(policy.delay_for(u32::MAX) <= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let calls = AtomicU32::new(0);
        let out = with_retry("#P1", &fast_policy(3), Duration::from_secs(1), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ProviderError::RateLimited)
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(out.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let out: Result<(), _> = with_retry("#P1", &fast_policy(2), Duration::from_secs(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ProviderError::Transport("reset".into())) }
        })
        .await;
        assert!(matches!(out, Err(ProviderError::Transport(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let calls = AtomicU32::new(0);
        let out: Result<(), _> = with_retry("#P1", &fast_policy(5), Duration::from_secs(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ProviderError::NotFound("#P1".into())) }
        })
        .await;
        assert!(matches!(out, Err(ProviderError::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stalled_attempt_times_out() {
        let out: Result<(), _> = with_retry("#P1", &RetryPolicy::none(), Duration::from_millis(20), || async {
            sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .await;
        assert!(matches!(out, Err(ProviderError::Timeout(_))));
    }
}
