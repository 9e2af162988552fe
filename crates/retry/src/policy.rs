use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::backoff::ExponentialBackoff;

/// Attempt budget and delay schedule for one unit of retryable work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay_ms: initial_delay.as_millis() as u64,
            max_delay_ms: max_delay.as_millis() as u64,
        }
    }

    /// A single attempt, no retries
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(
            Duration::from_millis(self.initial_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }

    /// Run `op` until it succeeds, fails permanently or the budget runs out.
    ///
    /// `op` receives the 1-based attempt number. Only errors for which
    /// `is_transient` returns true are retried.
    pub async fn run<T, E, F, Fut, C>(&self, mut op: F, is_transient: C) -> Result<Retried<T>, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> bool,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut backoff = self.backoff();
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(Retried { value, attempts: attempt }),
                Err(error) if !is_transient(&error) => {
                    return Err(RetryError::Permanent {
                        attempts: attempt,
                        error,
                    })
                }
                Err(last) if attempt >= max_attempts => {
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last,
                    })
                }
                Err(_) => {
                    let delay = backoff.next_delay();
                    debug!(attempt, delay_ms = delay.as_millis() as u64, "Transient failure, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500), Duration::from_secs(10))
    }
}

/// Successful value plus the attempts it took
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retried<T> {
    pub value: T,
    pub attempts: u32,
}

#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },

    #[error("permanent failure on attempt {attempts}: {error}")]
    Permanent { attempts: u32, error: E },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } | RetryError::Permanent { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { last, .. } => last,
            RetryError::Permanent { error, .. } => error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, PartialEq)]
    enum Fault {
        Flaky,
        Broken,
    }

    fn transient(f: &Fault) -> bool {
        *f == Fault::Flaky
    }

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1), Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = fast(3)
            .run(
                |attempt| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if attempt < 3 {
                            Err(Fault::Flaky)
                        } else {
                            Ok("bytes")
                        }
                    }
                },
                transient,
            )
            .await
            .unwrap();
        assert_eq!(result.value, "bytes");
        assert_eq!(result.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausts_budget() {
        let err = fast(2)
            .run(|_| async { Err::<(), _>(Fault::Flaky) }, transient)
            .await
            .unwrap_err();
        assert!(matches!(err, RetryError::Exhausted { attempts: 2, .. }));
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let calls = AtomicU32::new(0);
        let err = fast(5)
            .run(
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>(Fault::Broken) }
                },
                transient,
            )
            .await
            .unwrap_err();
        assert_eq!(err.attempts(), 1);
        assert_eq!(err.into_inner(), Fault::Broken);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
