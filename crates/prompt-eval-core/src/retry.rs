//! Fixed-delay retry for fallible async operations.
//!
//! [`run_with_retry`] is the plain form: up to `max_attempts` calls with a
//! constant pause between failures, returning the last error unchanged.
//! [`RetryExecutor`] adds a per-attempt timeout and cooperative
//! cancellation, and is what the evaluator uses for service calls.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::metrics::METRICS;
use crate::obs;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Call `operation` until it succeeds or `max_attempts` calls have failed.
///
/// Sleeps `delay` between attempts, never after the last one. A
/// `max_attempts` of zero is treated as one.
pub async fn run_with_retry<T, E, F, Fut>(
    mut operation: F,
    max_attempts: u32,
    delay: Duration,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= max_attempts => return Err(err),
            Err(err) => {
                obs::emit_attempt_failed("operation", attempt, max_attempts, &err);
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// How many times to try, how long to wait between tries, and how long a
/// single try may run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    /// `None` lets an attempt run until the operation itself gives up.
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
            attempt_timeout: None,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            attempt_timeout: None,
        }
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }
}

/// Why a single attempt did not produce a value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptFailure<E> {
    Failed(E),
    TimedOut(Duration),
}

impl<E: fmt::Display> fmt::Display for AttemptFailure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptFailure::Failed(err) => err.fmt(f),
            AttemptFailure::TimedOut(after) => write!(f, "attempt timed out after {after:?}"),
        }
    }
}

impl<E> std::error::Error for AttemptFailure<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AttemptFailure::Failed(err) => Some(err),
            AttemptFailure::TimedOut(_) => None,
        }
    }
}

/// Outcome of a [`RetryExecutor::run`] that produced no value.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryError<E> {
    /// Every attempt failed; `last` is the final failure.
    Exhausted {
        attempts: u32,
        last: AttemptFailure<E>,
    },
    /// The cancellation token fired; `attempts` were started.
    Cancelled { attempts: u32 },
}

impl<E> RetryError<E> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } | RetryError::Cancelled { attempts } => {
                *attempts
            }
        }
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Exhausted { attempts, last } => {
                write!(f, "failed after {attempts} attempt(s): {last}")
            }
            RetryError::Cancelled { attempts } => {
                write!(f, "cancelled after {attempts} attempt(s)")
            }
        }
    }
}

impl<E> std::error::Error for RetryError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RetryError::Exhausted { last, .. } => Some(last),
            RetryError::Cancelled { .. } => None,
        }
    }
}

/// Retry loop with per-attempt timeout and cancellation.
///
/// Cancellation is observed before each attempt, while an attempt is in
/// flight, and during the pause between attempts.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy, cancel: CancellationToken) -> Self {
        Self { policy, cancel }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` under the policy. `label` names the operation in
    /// log events.
    pub async fn run<T, E, F, Fut>(
        &self,
        label: &str,
        mut operation: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            if self.cancel.is_cancelled() {
                return Err(RetryError::Cancelled { attempts: attempt });
            }
            attempt += 1;
            debug!(operation = label, attempt, max_attempts, "starting attempt");

            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return Err(RetryError::Cancelled { attempts: attempt });
                }
                outcome = self.attempt(&mut operation) => outcome,
            };

            let failure = match outcome {
                Ok(value) => return Ok(value),
                Err(failure) => failure,
            };

            METRICS.inc_attempts_failed();
            obs::emit_attempt_failed(label, attempt, max_attempts, &failure);

            if attempt >= max_attempts {
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: failure,
                });
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return Err(RetryError::Cancelled { attempts: attempt });
                }
                _ = tokio::time::sleep(self.policy.delay) => {}
            }
        }
    }

    async fn attempt<T, E, F, Fut>(&self, operation: &mut F) -> Result<T, AttemptFailure<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match self.policy.attempt_timeout {
            Some(limit) => match tokio::time::timeout(limit, operation()).await {
                Ok(result) => result.map_err(AttemptFailure::Failed),
                Err(_) => Err(AttemptFailure::TimedOut(limit)),
            },
            None => operation().await.map_err(AttemptFailure::Failed),
        }
    }
}
