use crate::{ClientError, Result};
use futures::future::BoxFuture;
use std::time::Duration;
use tracing::warn;

/// Delay schedule between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `(retry - 1) * step`: no delay before the first retry, then growing
    Linear { step: Duration },
    /// Same delay before every retry
    Fixed(Duration),
}

impl Backoff {
    /// Delay before retry number `retry` (1-based)
    pub fn delay(&self, retry: u32) -> Duration {
        match *self {
            Backoff::Linear { step } => step * retry.saturating_sub(1),
            Backoff::Fixed(delay) => delay,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn linear(max_attempts: u32, step: Duration) -> Self {
        RetryPolicy {
            max_attempts,
            backoff: Backoff::Linear { step },
        }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        RetryPolicy {
            max_attempts,
            backoff: Backoff::Fixed(delay),
        }
    }

    /// Per-call policy of [`ResilientCaller`](crate::ResilientCaller): 5 attempts, 0/1/2/3 s apart
    pub fn resilient() -> Self {
        RetryPolicy::linear(5, Duration::from_secs(1))
    }

    /// Per-pull policy of a work source: 5 attempts, 500 ms apart
    pub fn work_source() -> Self {
        RetryPolicy::fixed(5, Duration::from_millis(500))
    }

    /// Never retry
    pub fn none() -> Self {
        RetryPolicy::fixed(1, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::resilient()
    }
}

/// Run `call` against `target` until it succeeds, fails with an error
/// `retryable` rejects, or the policy runs out of attempts.
///
/// Exhaustion is reported as [`ClientError::ConnectionExhausted`] carrying the
/// last failure. No delay follows the final attempt.
pub async fn retry_with<S, R, F>(
    policy: &RetryPolicy,
    operation: &'static str,
    target: &mut S,
    retryable: fn(&ClientError) -> bool,
    mut call: F,
) -> Result<R>
where
    S: Send + ?Sized,
    R: Send,
    F: for<'c> FnMut(&'c mut S) -> BoxFuture<'c, Result<R>> + Send,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match call(&mut *target).await {
            Ok(value) => return Ok(value),
            Err(e) if retryable(&e) => {
                if attempt >= max_attempts {
                    return Err(ClientError::ConnectionExhausted {
                        operation,
                        attempts: attempt,
                        source: Box::new(e),
                    });
                }

                let delay = policy.backoff.delay(attempt);
                warn!(
                    operation,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Transient failure: {}",
                    e
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
