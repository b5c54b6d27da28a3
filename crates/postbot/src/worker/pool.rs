use std::thread::{self, JoinHandle};

use log::{debug, error, info};

use super::ticker::{channel, PollSchedule, Shutdown, Ticker};
use super::{Stage, StageWorker};
use crate::error::WorkerError;

/// Owns every polling thread of the bot and the shutdown signal they share.
pub struct WorkerPool {
    shutdown: Shutdown,
    ticker: Ticker,
    workers: Vec<(String, JoinHandle<()>)>,
}

impl WorkerPool {
    pub fn new(schedule: PollSchedule) -> Self {
        let (shutdown, ticker) = channel(schedule);
        Self {
            shutdown,
            ticker,
            workers: Vec::new(),
        }
    }

    /// A ticker wired to this pool's shutdown.
    pub fn ticker(&self) -> Ticker {
        self.ticker.clone()
    }

    /// A handle that stops the pool from another thread, e.g. a signal handler.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Runs `worker` on its own named thread.
    pub fn spawn_stage<S: Stage + 'static>(
        &mut self,
        worker: StageWorker<S>,
    ) -> Result<(), WorkerError> {
        let name = worker.stage().label();
        self.spawn(name, move || worker.run())
    }

    /// Runs a polling loop on its own named thread. The loop must return
    /// once its ticker reports shutdown.
    pub fn spawn<F>(&mut self, name: impl Into<String>, body: F) -> Result<(), WorkerError>
    where
        F: FnOnce() + Send + 'static,
    {
        let name = name.into();
        if self.is_shutdown() {
            return Err(WorkerError::ChannelClosed);
        }

        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(body)
            .map_err(|source| WorkerError::SpawnFailed {
                name: name.clone(),
                source,
            })?;

        debug!("Started worker {}", name);
        self.workers.push((name, handle));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.workers.iter().map(|(name, _)| name.as_str())
    }

    pub fn shutdown(&self) {
        info!("Shutting down {} workers...", self.workers.len());
        self.shutdown.trigger();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_triggered()
    }

    /// Signals shutdown and joins every worker. Workers finish the job in
    /// hand first.
    pub fn wait(self) {
        self.shutdown.trigger();

        for (name, worker) in self.workers {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", name, e);
            } else {
                debug!("Worker {} finished", name);
            }
        }

        info!("All workers have stopped");
    }
}
