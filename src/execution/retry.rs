//! Bounded retry with fixed backoff for network operations

use crate::reporting::ReportingSink;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Retry limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum attempts, including the first
    pub max_attempts: usize,

    /// Pause between a failed attempt and the next one
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Duration::from_secs(5),
        }
    }
}

/// Why a retried operation gave up
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Every attempt failed with a retryable error
    #[error("gave up after {attempts} attempts: {last_error}")]
    Exhausted { attempts: usize, last_error: E },

    /// An error that retrying cannot fix
    #[error("{0}")]
    Fatal(E),
}

impl<E> RetryError<E> {
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { last_error, .. } => last_error,
            RetryError::Fatal(e) => e,
        }
    }
}

/// Runs an operation until it succeeds, fails fatally, or runs out of attempts
///
/// Attempts are sequential. Partial side effects of a failed attempt are not
/// rolled back, so the operation must be safe to repeat.
#[derive(Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    sink: Arc<dyn ReportingSink>,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy, sink: Arc<dyn ReportingSink>) -> Self {
        Self { policy, sink }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute `operation`, retrying errors for which `is_retryable` holds
    pub async fn execute<T, E, F, Fut, P>(
        &self,
        name: &str,
        mut operation: F,
        is_retryable: P,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: Display,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            debug!("{}: attempt {}/{}", name, attempt, max_attempts);
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !is_retryable(&error) {
                return Err(RetryError::Fatal(error));
            }

            if attempt >= max_attempts {
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last_error: error,
                });
            }

            let message = format!(
                "{} failed (attempt {}/{}): {}. Retrying in {}s",
                name,
                attempt,
                max_attempts,
                error,
                self.policy.backoff.as_secs()
            );
            self.sink.warning(&message);

            tokio::time::sleep(self.policy.backoff).await;
            attempt += 1;
        }
    }
}
