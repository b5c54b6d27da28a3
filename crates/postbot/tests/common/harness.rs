//! Isolated job store for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use postbot::worker::{channel, PollSchedule, Shutdown, Stage, StageWorker, Ticker, TickReport};
use postbot::{Database, Job, JobStore};

pub struct TestHarness {
    temp_dir: TempDir,
    pub db_path: PathBuf,
    pub store: JobStore,
    shutdown: Shutdown,
    ticker: Ticker,
}

impl TestHarness {
    /// A file-backed store in a fresh temp directory.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("data").join("postbot.db");
        let db = Database::open(&db_path).expect("Failed to open database");
        let (shutdown, ticker) = channel(PollSchedule::from_secs(1, 1));

        Self {
            temp_dir,
            db_path,
            store: JobStore::new(db),
            shutdown,
            ticker,
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// A ticker that stays running for the life of the harness.
    pub fn ticker(&self) -> Ticker {
        self.ticker.clone()
    }

    pub fn shutdown(&self) {
        self.shutdown.trigger();
    }

    pub fn worker<S: Stage>(&self, stage: S) -> StageWorker<S> {
        StageWorker::new(stage, self.store.clone(), self.ticker())
    }

    /// Runs `worker` until a pass finds nothing to do.
    pub fn drain<S: Stage>(&self, worker: &StageWorker<S>) -> Vec<TickReport> {
        let mut reports = Vec::new();
        for _ in 0..20 {
            let report = worker.run_once().expect("Failed to fetch pending jobs");
            if report.fetched == 0 {
                break;
            }
            reports.push(report);
        }
        reports
    }

    pub fn reload(&self, job: &Job) -> Job {
        self.store
            .find(job.id)
            .expect("Failed to load job")
            .expect("Job disappeared")
    }

    pub fn write_config(&self, filename: &str, json: &str) -> PathBuf {
        let path = self.temp_dir.path().join(filename);
        std::fs::write(&path, json).expect("Failed to write config file");
        path
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
