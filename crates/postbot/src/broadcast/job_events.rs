//! Job status change events.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::job::{Job, JobId, JobStatus};

/// Default channel capacity. Slow subscribers lag rather than block saves.
pub const DEFAULT_CAPACITY: usize = 256;

/// A job moved from one status to another.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEvent {
    pub job_id: JobId,
    pub owner: String,
    pub from: JobStatus,
    pub to: JobStatus,
    pub timestamp: DateTime<Utc>,
}

impl JobEvent {
    /// Event for `job`, whose status is already the new one.
    pub fn transition(job: &Job, from: JobStatus) -> Self {
        Self {
            job_id: job.id,
            owner: job.owner.clone(),
            from,
            to: job.status(),
            timestamp: Utc::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.to.is_terminal()
    }
}

/// Fan-out of [`JobEvent`]s to any number of receivers.
#[derive(Clone)]
pub struct JobEventBroadcaster {
    sender: Arc<broadcast::Sender<JobEvent>>,
}

impl JobEventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Sends an event to all subscribers.
    pub fn send(&self, event: JobEvent) {
        // No receivers is fine.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for JobEventBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
