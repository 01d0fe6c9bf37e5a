//! Bounded retry and per-call timeouts.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{CodegenError, Result};

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay after every failed attempt.
    Fixed(Duration),
    /// `base * 2^(attempt-1)`, capped at `max`.
    Exponential { base: Duration, max: Duration },
}

impl Backoff {
    /// Delay after failed attempt number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Fixed(d) => d,
            Backoff::Exponential { base, max } => {
                let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
                base.checked_mul(factor).unwrap_or(max).min(max)
            }
        }
    }
}

/// How many times to try and how long to wait.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
    /// Deadline for a single attempt.
    pub attempt_timeout: Option<Duration>,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Backoff::Fixed(delay),
            attempt_timeout: None,
        }
    }

    pub fn exponential(max_attempts: u32, base: Duration, max: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Backoff::Exponential { base, max },
            attempt_timeout: None,
        }
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }
}

/// Run `f` until it succeeds or the policy is exhausted.
///
/// Each failed attempt logs a warning. On exhaustion the last error is
/// returned unchanged. Configuration errors are not retried. Cancellation
/// interrupts both the attempt and the delay.
pub async fn retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    cancel: &CancellationToken,
    mut f: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        if cancel.is_cancelled() {
            return Err(CodegenError::Cancelled);
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(CodegenError::Cancelled),
            r = run_attempt(policy.attempt_timeout, operation, f(attempt)) => r,
        };

        let err = match result {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation, attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        if matches!(err, CodegenError::Config(_) | CodegenError::Cancelled) {
            return Err(err);
        }

        warn!(
            operation,
            attempt,
            max_attempts = policy.max_attempts,
            error = %err,
            "Attempt {}/{} of {} failed",
            attempt,
            policy.max_attempts,
            operation
        );

        if attempt >= policy.max_attempts {
            return Err(err);
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(CodegenError::Cancelled),
            _ = tokio::time::sleep(policy.backoff.delay(attempt)) => {}
        }
    }
}

async fn run_attempt<T, Fut>(timeout: Option<Duration>, operation: &str, fut: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    match timeout {
        Some(after) => with_timeout(operation, after, fut).await,
        None => fut.await,
    }
}

/// Bound an I/O call with a deadline.
pub async fn with_timeout<T, Fut>(operation: &str, after: Duration, fut: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => Err(CodegenError::Timeout {
            operation: operation.to_string(),
            after,
        }),
    }
}
