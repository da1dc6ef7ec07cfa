//! Bounded retry with a fixed interval.

use crate::error::RetryTimeout;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Run `operation` until it succeeds or `timeout` elapses.
///
/// Attempts are spaced `interval` apart and each one is cut off at the
/// deadline. Errors from failed attempts are logged at debug level and
/// dropped; only the timeout is surfaced.
pub async fn retry<T, E, F, Fut>(
    mut operation: F,
    interval: Duration,
    timeout: Duration,
) -> std::result::Result<T, RetryTimeout>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Display,
{
    let start = Instant::now();
    let deadline = start + timeout;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        match tokio::time::timeout_at(deadline, operation()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => log::debug!("Attempt {} failed: {}", attempts, e),
            Err(_) => {
                log::debug!("Attempt {} cut off at deadline", attempts);
                break;
            }
        }

        let next = Instant::now() + interval;
        if next >= deadline {
            break;
        }
        tokio::time::sleep_until(next).await;
    }

    Err(RetryTimeout {
        attempts,
        elapsed: start.elapsed(),
    })
}
