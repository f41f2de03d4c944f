//! Recovery from transient failures.
//!
//! # Design
//! Two independent loops wrap every attempt:
//! - reuse recovery: a transport that reports `CannotSend` has its
//!   connection reset, and the same request is sent again after a short
//!   pause, up to `reuse_ceiling` resets;
//! - busy backoff: a 503 response is retried after `retry_delay`, up to
//!   `retry_attempts` retries.
//!
//! `with_busy_backoff` takes the attempt as a closure, so each busy retry runs
//! its own reuse-recovery loop. Sleeping goes through `Sleeper`, so tests can
//! count waits instead of spending wall-clock time.

use std::time::Duration;

use crate::connection::{ConnectionManager, Connector, TransportError};
use crate::error::ApiError;
use crate::http::{HttpRequest, HttpResponse};
use crate::logging::Logger;

pub const DEFAULT_RETRY_ATTEMPTS: u32 = 10;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_REUSE_RETRY_CEILING: u32 = 11;
pub const DEFAULT_REUSE_DELAY: Duration = Duration::from_millis(500);

const STATUS_SERVICE_UNAVAILABLE: u16 = 503;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after a 503 before giving up.
    pub retry_attempts: u32,
    /// Pause before each 503 retry.
    pub retry_delay: Duration,
    /// Connection resets after reuse failures before giving up.
    pub reuse_ceiling: u32,
    /// Pause after each connection reset.
    pub reuse_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            reuse_ceiling: DEFAULT_REUSE_RETRY_CEILING,
            reuse_delay: DEFAULT_REUSE_DELAY,
        }
    }
}

/// Blocking pause between attempts.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

impl<F> Sleeper for F
where
    F: Fn(Duration) + Send + Sync,
{
    fn sleep(&self, duration: Duration) {
        self(duration)
    }
}

/// Send `request`, resetting the connection on reuse failures.
///
/// Each `CannotSend` triggers one reset and one pause until `reuse_ceiling`
/// resets have been spent; the next `CannotSend` is returned as-is. Any other
/// transport error is returned immediately.
pub fn send_with_reuse_recovery<C: Connector>(
    connection: &mut ConnectionManager<C>,
    request: &HttpRequest,
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    logger: &dyn Logger,
) -> Result<HttpResponse, TransportError> {
    let mut resets = 0u32;
    loop {
        match connection.send(request) {
            Ok(response) => return Ok(response),
            Err(err) if err.is_reuse_failure() => {
                if resets >= policy.reuse_ceiling {
                    return Err(err);
                }
                resets += 1;
                logger.warning(&format!(
                    "{err} on {} {}; resetting connection ({resets}/{})",
                    request.method, request.path, policy.reuse_ceiling
                ));
                connection.reset();
                sleeper.sleep(policy.reuse_delay);
            }
            Err(err) => return Err(err),
        }
    }
}

/// Run `attempt` until it yields a non-503 response.
///
/// A warning is logged before every pause, including the one after which the
/// retry budget runs out, so a request that never succeeds logs
/// `retry_attempts + 1` warnings and one error.
pub fn with_busy_backoff<F>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    logger: &dyn Logger,
    mut attempt: F,
) -> Result<HttpResponse, ApiError>
where
    F: FnMut() -> Result<HttpResponse, ApiError>,
{
    let mut response = attempt()?;
    let mut retries = 0u32;
    while response.status == STATUS_SERVICE_UNAVAILABLE {
        logger.warning(&format!(
            "Server not available error when contacting Vidispine. Waiting {}s before retry.",
            format_secs(policy.retry_delay)
        ));
        sleeper.sleep(policy.retry_delay);
        retries += 1;
        if retries > policy.retry_attempts {
            logger.error(&format!(
                "Did not work after {} retries, giving up",
                policy.retry_attempts
            ));
            return Err(ApiError::ServerBusy {
                attempts: policy.retry_attempts,
            });
        }
        response = attempt()?;
    }
    Ok(response)
}

// Whole seconds print without a fractional part.
fn format_secs(duration: Duration) -> String {
    if duration.subsec_nanos() == 0 {
        duration.as_secs().to_string()
    } else {
        duration.as_secs_f64().to_string()
    }
}
