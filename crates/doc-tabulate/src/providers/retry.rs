//! Exponential-backoff retry for provider requests

use reqwest::StatusCode;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{Error, Result};

/// Longest single backoff sleep
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Map a non-success provider status to an error; 429 and 5xx are retryable
pub fn status_error(status: StatusCode, message: String) -> Error {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Error::unavailable(message)
    } else {
        Error::llm(message)
    }
}

fn backoff(attempt: u32) -> Duration {
    2u64.checked_pow(attempt)
        .map(Duration::from_secs)
        .map_or(MAX_BACKOFF, |delay| delay.min(MAX_BACKOFF))
}

/// Run `operation` up to `max_retries + 1` times, sleeping 1s, 2s, 4s, ... between attempts.
///
/// Errors that are not [`Error::is_retryable`] are returned immediately.
pub async fn retry_request<F, Fut, T>(max_retries: u32, operation: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = None;

    for attempt in 0..=max_retries {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => {
                if attempt < max_retries {
                    let delay = backoff(attempt);
                    tracing::warn!(
                        "Request failed (attempt {}/{}): {}, retrying in {:?}",
                        attempt + 1,
                        max_retries + 1,
                        e,
                        delay
                    );
                    sleep(delay).await;
                }
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| Error::llm("Unknown error")))
}
