// src/retry.rs

//! Bounded retry with a caller-supplied sleep schedule.
//!
//! A [`Retryable`] wraps a runner that reports, per attempt, whether the
//! caller's exit condition was reached and what the attempt produced. The
//! schedule is consumed left to right: sleep, invoke, stop once the exit
//! condition holds. An error on an intermediate attempt does not stop the
//! loop; only the exit condition does.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::errors::{DevloopError, Result};

/// Result of a single runner invocation.
#[derive(Debug)]
pub struct Attempt<T> {
    /// Whether the exit condition was reached.
    pub done: bool,
    pub outcome: anyhow::Result<T>,
}

impl<T> Attempt<T> {
    pub fn done(outcome: anyhow::Result<T>) -> Self {
        Self {
            done: true,
            outcome,
        }
    }

    pub fn pending(outcome: anyhow::Result<T>) -> Self {
        Self {
            done: false,
            outcome,
        }
    }
}

pub struct Retryable<F> {
    description: String,
    runner: F,
    error_if_timeout: bool,
}

impl<F, Fut, T> Retryable<F>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Attempt<T>>,
{
    pub fn new(description: impl Into<String>, runner: F) -> Self {
        Self {
            description: description.into(),
            runner,
            error_if_timeout: false,
        }
    }

    /// Turn an exhausted schedule into a `RetryTimeout` error.
    pub fn error_if_timeout(mut self, error_if_timeout: bool) -> Self {
        self.error_if_timeout = error_if_timeout;
        self
    }

    /// Run according to `schedule`.
    ///
    /// - Empty schedule: one invocation, no sleep, result returned as-is.
    /// - Otherwise: for each entry sleep then invoke, stopping at the first
    ///   attempt with `done == true`.
    /// - Exhausted: `RetryTimeout` wrapping the last error when
    ///   `error_if_timeout`, else the last attempt's outcome unchanged.
    pub async fn retry_with_schedule(mut self, schedule: &[Duration]) -> Result<T> {
        if schedule.is_empty() {
            let attempt = (self.runner)().await;
            return attempt.outcome.map_err(DevloopError::from);
        }

        let mut last: Option<anyhow::Result<T>> = None;

        for (i, delay) in schedule.iter().enumerate() {
            sleep(*delay).await;
            debug!(
                description = %self.description,
                attempt = i + 1,
                of = schedule.len(),
                "retry attempt"
            );

            let attempt = (self.runner)().await;
            if attempt.done {
                return attempt.outcome.map_err(DevloopError::from);
            }
            last = Some(attempt.outcome);
        }

        // Always set for a non-empty schedule.
        let Some(last) = last else {
            return Err(DevloopError::RetryTimeout {
                description: self.description,
                last: None,
            });
        };

        if self.error_if_timeout {
            return Err(DevloopError::RetryTimeout {
                description: self.description,
                last: last.err(),
            });
        }

        warn!(
            description = %self.description,
            "retry schedule exhausted without reaching the exit condition"
        );
        last.map_err(DevloopError::from)
    }
}
