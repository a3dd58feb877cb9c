#[cfg(test)]
mod tests;

use std::time::Duration;

use anyhow::{Result, anyhow};
use thiserror::Error;
use tracing::{debug, error, warn};

pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const EXPONENTIAL_BACKOFF_BASE: u64 = 2;

/// Build a blocking agent with a global timeout shared by all provider clients.
#[inline]
pub fn new_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into()
}

/// Typed status carried at the root of request errors, so callers can branch
/// on specific codes without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("HTTP {status}")]
pub struct StatusError {
    pub status: u16,
}

/// The HTTP status behind an error returned by [`request_with_retry`], if
/// any, regardless of context layers added along the way.
#[inline]
pub fn error_status(error: &anyhow::Error) -> Option<u16> {
    error.downcast_ref::<StatusError>().map(|e| e.status)
}

/// Whether a failed request is worth retrying. Server errors and rate limiting
/// are transient; other client errors are not.
#[inline]
pub fn is_retryable_status(status: u16) -> bool {
    status >= 500 || status == 429
}

/// Execute a request closure with bounded retries and exponential backoff.
///
/// Transport failures and retryable statuses are retried up to `retry_attempts`
/// times; any other error fails immediately.
#[inline]
pub fn request_with_retry<F>(what: &str, retry_attempts: u32, mut request_fn: F) -> Result<String>
where
    F: FnMut() -> Result<String, ureq::Error>,
{
    let mut last_error = None;

    for attempt in 1..=retry_attempts {
        debug!("{}: attempt {}/{}", what, attempt, retry_attempts);

        match request_fn() {
            Ok(response_text) => {
                debug!("{}: succeeded on attempt {}", what, attempt);
                return Ok(response_text);
            }
            Err(ureq::Error::StatusCode(status)) => {
                let status_error = anyhow::Error::new(StatusError { status })
                    .context(format!("{}: HTTP {}", what, status));

                if !is_retryable_status(status) {
                    warn!("{}: client error (status {}), not retrying", what, status);
                    return Err(status_error);
                }

                warn!(
                    "{}: server error (status {}), attempt {}/{}",
                    what, status, attempt, retry_attempts
                );
                last_error = Some(status_error);

                if attempt < retry_attempts {
                    let delay_ms = EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) * 1000;
                    let delay = Duration::from_millis(delay_ms);
                    debug!("{}: waiting {:?} before retry", what, delay);
                    std::thread::sleep(delay);
                }
            }
            Err(
                error @ (ureq::Error::ConnectionFailed
                | ureq::Error::HostNotFound
                | ureq::Error::Timeout(_)
                | ureq::Error::Io(_)),
            ) => {
                warn!(
                    "{}: transport error: {}, attempt {}/{}",
                    what, error, attempt, retry_attempts
                );
                last_error = Some(anyhow!("{}: request error: {}", what, error));

                if attempt < retry_attempts {
                    let delay_ms = EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) * 1000;
                    let delay = Duration::from_millis(delay_ms);
                    debug!("{}: waiting {:?} before retry", what, delay);
                    std::thread::sleep(delay);
                }
            }
            Err(error) => {
                warn!("{}: non-retryable error: {}", what, error);
                return Err(anyhow!("{}: non-retryable error: {}", what, error));
            }
        }
    }

    error!("{}: all retry attempts failed", what);

    Err(last_error.unwrap_or_else(|| anyhow!("{}: request failed after retries", what)))
}
