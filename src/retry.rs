//! Generic bounded-retry-with-exponential-backoff utility, shared by both
//! external adapters. One reusable function instead of scattering retry
//! loops across each call site.

use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub multiplier: f64,
    pub cap: Duration,
}

impl RetryPolicy {
    pub const LLM: RetryPolicy = RetryPolicy {
        max_retries: 2,
        initial_backoff: Duration::from_secs(1),
        multiplier: 2.0,
        cap: Duration::from_secs(60),
    };

    pub const DATASTORE_CONNECTION: RetryPolicy = RetryPolicy {
        max_retries: 1,
        initial_backoff: Duration::from_millis(200),
        multiplier: 2.0,
        cap: Duration::from_secs(5),
    };

    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let millis = self.initial_backoff.as_millis() as f64 * self.multiplier.powi(attempt as i32);
        Duration::from_millis(millis as u64).min(self.cap)
    }
}

/// Classifies whether a failure from an adapter call is worth retrying.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Runs `attempt` up to `policy.max_retries + 1` times, sleeping with
/// exponential backoff between retryable failures. Returns the last error
/// if every attempt fails or a non-retryable error is hit immediately.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    mut attempt: F,
) -> Result<(T, u32), E>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: Retryable,
{
    let mut last_err = None;
    for try_index in 0..=policy.max_retries {
        match attempt(try_index).await {
            Ok(v) => return Ok((v, try_index)),
            Err(e) => {
                let retryable = e.is_retryable();
                last_err = Some(e);
                if !retryable || try_index == policy.max_retries {
                    break;
                }
                tokio::time::sleep(policy.backoff_for_attempt(try_index)).await;
            }
        }
    }
    Err(last_err.expect("loop always runs at least once"))
}
