use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tokio::time::timeout;
use tracing::debug;
use tracing::warn;

use crate::BackoffPolicy;
use crate::Error;
use crate::Result;

/// Runs `task` until it succeeds, each attempt bounded by the policy timeout,
/// sleeping an exponentially growing (jittered) delay between attempts.
pub(crate) async fn task_with_timeout_and_exponential_backoff<F, T, P>(
    task: F,
    policy: BackoffPolicy,
) -> Result<P>
where
    F: Fn() -> T,                               // The type of the async function
    T: std::future::Future<Output = Result<P>>, // The future returned by the async function
{
    let mut retries = 0;
    let mut current_delay = Duration::from_millis(policy.base_delay_ms);
    let timeout_duration = Duration::from_millis(policy.timeout_ms);
    let max_delay = Duration::from_millis(policy.max_delay_ms);
    let max_retries = policy.max_retries;

    let mut last_error = Error::RetryTaskFailed("Task failed after max retries".to_string());
    while retries < max_retries {
        match timeout(timeout_duration, task()).await {
            Ok(Ok(r)) => {
                return Ok(r); // Exit on success
            }
            Ok(Err(error)) => {
                if !error.is_retryable() && !error.is_not_found() {
                    warn!(?error, "task failed with non-retryable error");
                    return Err(error);
                }
                warn!(?error, "failed with error.");
                last_error = error;
            }
            Err(error) => {
                warn!(?timeout_duration, ?error, "Task timed out");
                last_error = Error::RetryTimeout(timeout_duration);
            }
        };

        if retries < max_retries - 1 {
            let delay = with_jitter(current_delay);
            debug!("Retrying in {:?}...", delay);
            sleep(delay).await;

            // Exponential backoff (double the delay each time)
            current_delay = (current_delay * 2).min(max_delay);
        }
        retries += 1;
    }
    warn!("Task failed after {} retries", max_retries);
    Err(last_error)
}

/// Adds up to 10% of random extra delay
fn with_jitter(delay: Duration) -> Duration {
    let spread = delay.as_millis() as u64 / 10;
    if spread == 0 {
        return delay;
    }
    delay + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
}
