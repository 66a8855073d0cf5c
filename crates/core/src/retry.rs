//! Bounded retry policy applied explicitly at call sites.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

/// Outcome of a retried operation that did not succeed.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Every attempt failed with a retryable error.
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },

    /// An attempt failed with an error that must not be retried.
    #[error("{0}")]
    Fatal(E),
}

impl<E> RetryError<E> {
    /// The error of the last attempt.
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { last, .. } => last,
            RetryError::Fatal(e) => e,
        }
    }
}

/// How many times to run an operation and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::immediate(20)
    }
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Retry without any delay between attempts.
    pub const fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Run a synchronous operation. `op` receives the 1-based attempt number.
    pub fn run_blocking<T, E, F, P>(&self, mut op: F, is_retryable: P) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Result<T, E>,
        P: Fn(&E) -> bool,
    {
        let attempts = self.attempts();
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(e) if !is_retryable(&e) => return Err(RetryError::Fatal(e)),
                Err(e) if attempt >= attempts => {
                    return Err(RetryError::Exhausted { attempts, last: e })
                }
                Err(_) => {
                    debug!(attempt, max_attempts = attempts, "Retrying operation");
                    if !self.backoff.is_zero() {
                        std::thread::sleep(self.backoff);
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// Run an async operation. `op` receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut, P>(&self, mut op: F, is_retryable: P) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let attempts = self.attempts();
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if !is_retryable(&e) => return Err(RetryError::Fatal(e)),
                Err(e) if attempt >= attempts => {
                    return Err(RetryError::Exhausted { attempts, last: e })
                }
                Err(_) => {
                    debug!(attempt, max_attempts = attempts, "Retrying operation");
                    if self.backoff.is_zero() {
                        tokio::task::yield_now().await;
                    } else {
                        tokio::time::sleep(self.backoff).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}
