//! Interruptible waits between polls.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};

/// How long a loop rests after a batch and after finding no work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    pub poll_interval: Duration,
    pub idle_interval: Duration,
}

impl PollSchedule {
    pub const DEFAULT_SECS: u64 = 30;

    pub fn new(poll_interval: Duration, idle_interval: Duration) -> Self {
        Self {
            poll_interval,
            idle_interval,
        }
    }

    pub fn from_secs(poll_secs: u64, idle_secs: u64) -> Self {
        Self::new(
            Duration::from_secs(poll_secs),
            Duration::from_secs(idle_secs),
        )
    }
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self::from_secs(Self::DEFAULT_SECS, Self::DEFAULT_SECS)
    }
}

/// Sleeps that end early once shutdown is triggered.
///
/// Every clone observes the same shutdown.
#[derive(Debug, Clone)]
pub struct Ticker {
    schedule: PollSchedule,
    stop: Receiver<()>,
}

impl Ticker {
    /// Same shutdown signal, different intervals.
    pub fn with_schedule(&self, schedule: PollSchedule) -> Self {
        Self {
            schedule,
            stop: self.stop.clone(),
        }
    }

    pub fn schedule(&self) -> PollSchedule {
        self.schedule
    }

    /// Waits up to `duration`. Returns false if shutdown was triggered.
    pub fn wait(&self, duration: Duration) -> bool {
        match self.stop.recv_timeout(duration) {
            Err(RecvTimeoutError::Timeout) => true,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    pub fn wait_poll(&self) -> bool {
        self.wait(self.schedule.poll_interval)
    }

    pub fn wait_idle(&self) -> bool {
        self.wait(self.schedule.idle_interval)
    }

    pub fn is_stopped(&self) -> bool {
        !matches!(self.stop.try_recv(), Err(TryRecvError::Empty))
    }
}

/// The sending half of the shutdown signal. Triggering drops the sender,
/// which wakes every waiting [`Ticker`].
#[derive(Debug, Clone)]
pub struct Shutdown {
    sender: Arc<Mutex<Option<Sender<()>>>>,
    triggered: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn trigger(&self) {
        self.triggered.store(true, Ordering::Relaxed);
        match self.sender.lock() {
            Ok(mut sender) => drop(sender.take()),
            Err(poisoned) => drop(poisoned.into_inner().take()),
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Relaxed)
    }
}

/// Creates a connected shutdown handle and ticker.
pub fn channel(schedule: PollSchedule) -> (Shutdown, Ticker) {
    let (sender, stop) = bounded::<()>(0);
    (
        Shutdown {
            sender: Arc::new(Mutex::new(Some(sender))),
            triggered: Arc::new(AtomicBool::new(false)),
        },
        Ticker { schedule, stop },
    )
}
