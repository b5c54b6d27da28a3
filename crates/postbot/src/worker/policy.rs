//! What a worker does when processing a job fails.

use std::time::Duration;

use super::{StageError, Ticker};
use crate::job::{Job, StageKind};

/// Failures are always logged and the attempt counted. An optional backoff
/// pauses the worker before the next job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailurePolicy {
    backoff: Option<Duration>,
}

impl FailurePolicy {
    pub fn log_and_continue() -> Self {
        Self { backoff: None }
    }

    /// A zero duration means no backoff.
    pub fn with_backoff(backoff: Duration) -> Self {
        Self {
            backoff: (!backoff.is_zero()).then_some(backoff),
        }
    }

    pub fn backoff(&self) -> Option<Duration> {
        self.backoff
    }

    /// Returns false if shutdown interrupted the backoff.
    pub fn on_error(&self, stage: StageKind, job: &Job, error: &StageError, ticker: &Ticker) -> bool {
        log::warn!(
            "{} stage failed for job {} ({}), attempt {}: {}",
            stage,
            job.id,
            job.source_id,
            job.attempts(stage) + 1,
            error
        );

        match self.backoff {
            Some(backoff) => ticker.wait(backoff),
            None => true,
        }
    }
}
