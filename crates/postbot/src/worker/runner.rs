use std::panic::{catch_unwind, AssertUnwindSafe};

use super::{FailurePolicy, StageError, Ticker};
use crate::error::StoreError;
use crate::job::{Job, StageKind, StageOutcome, StageQuery};
use crate::store::JobStore;

pub const DEFAULT_BATCH_SIZE: u32 = 20;

/// One pipeline stage for one bot.
pub trait Stage: Send {
    /// The jobs this stage pulls.
    fn query(&self) -> &StageQuery;

    fn kind(&self) -> StageKind {
        self.query().stage()
    }

    /// Name used in logs and thread names.
    fn label(&self) -> String {
        format!("{}-{}", self.kind(), self.query().owner())
    }

    /// Works on one job.
    ///
    /// May fill request fields on `job` (an image prompt, for instance).
    /// The result itself is written by the worker through [`Job::apply`].
    fn process(&self, job: &mut Job) -> Result<StageOutcome, StageError>;
}

/// What one pass over the pending jobs did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub fetched: usize,
    pub produced: usize,
    pub empty: usize,
    pub rejected: usize,
    pub errors: usize,
    pub save_errors: usize,
}

impl TickReport {
    fn count(&mut self, outcome: &StageOutcome) {
        match outcome {
            StageOutcome::Produced(_) => self.produced += 1,
            StageOutcome::Empty => self.empty += 1,
            StageOutcome::Rejected(_) => self.rejected += 1,
        }
    }

    pub fn processed(&self) -> usize {
        self.produced + self.empty + self.rejected + self.errors
    }
}

/// Polls the store for one stage's jobs and runs them through the stage.
pub struct StageWorker<S: Stage> {
    stage: S,
    store: JobStore,
    ticker: Ticker,
    batch_size: u32,
    policy: FailurePolicy,
}

impl<S: Stage> StageWorker<S> {
    pub fn new(stage: S, store: JobStore, ticker: Ticker) -> Self {
        Self {
            stage,
            store,
            ticker,
            batch_size: DEFAULT_BATCH_SIZE,
            policy: FailurePolicy::default(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn stage(&self) -> &S {
        &self.stage
    }

    /// Processes one batch of pending jobs.
    ///
    /// Only a failure to fetch the batch is returned. Failures on single
    /// jobs are logged and counted in the report.
    pub fn run_once(&self) -> Result<TickReport, StoreError> {
        let kind = self.stage.kind();
        let jobs = self.store.pending(self.stage.query(), self.batch_size)?;
        let mut report = TickReport {
            fetched: jobs.len(),
            ..TickReport::default()
        };

        for mut job in jobs {
            if self.ticker.is_stopped() {
                log::debug!("{}: shutdown requested, leaving job {}", self.stage.label(), job.id);
                break;
            }

            match guard(&self.stage, &mut job) {
                Ok(outcome) => {
                    log::debug!("{}: job {} -> {:?}", self.stage.label(), job.id, outcome);
                    report.count(&outcome);
                    job.apply(outcome);
                }
                Err(e) => {
                    report.errors += 1;
                    self.policy.on_error(kind, &job, &e, &self.ticker);
                }
            }

            job.record_attempt(kind);
            if let Err(e) = self.store.save(&mut job) {
                report.save_errors += 1;
                log::error!("{}: failed to save job {}: {}", self.stage.label(), job.id, e);
            }
        }

        Ok(report)
    }

    /// Polls until shutdown.
    pub fn run(&self) {
        let span = tracing::info_span!(
            "stage",
            stage = %self.stage.kind(),
            owner = self.stage.query().owner()
        );
        let _entered = span.enter();
        log::info!("{} worker started", self.stage.label());

        loop {
            let keep_running = match self.run_once() {
                Ok(report) if report.fetched == 0 => self.ticker.wait_idle(),
                Ok(report) => {
                    log::info!(
                        "{}: {} produced, {} empty, {} rejected, {} errors",
                        self.stage.label(),
                        report.produced,
                        report.empty,
                        report.rejected,
                        report.errors
                    );
                    self.ticker.wait_poll()
                }
                Err(e) => {
                    log::error!("{}: failed to fetch pending jobs: {}", self.stage.label(), e);
                    self.ticker.wait_poll()
                }
            };

            if !keep_running {
                break;
            }
        }

        log::info!("{} worker stopped", self.stage.label());
    }
}

/// Runs the stage, turning a panic into an ordinary failed attempt.
fn guard<S: Stage>(stage: &S, job: &mut Job) -> Result<StageOutcome, StageError> {
    match catch_unwind(AssertUnwindSafe(|| stage.process(job))) {
        Ok(result) => result,
        Err(payload) => {
            let message = if let Some(s) = payload.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            };
            Err(StageError::Panicked(message))
        }
    }
}
