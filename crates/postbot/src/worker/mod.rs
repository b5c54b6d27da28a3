//! Stage workers: one polling loop per pipeline stage and bot.

pub mod image;
pub mod policy;
pub mod pool;
pub mod publish;
pub mod runner;
pub mod text;
pub mod ticker;

use thiserror::Error;

use crate::collab::CollabError;
use crate::error::StoreError;

pub use image::ImageStage;
pub use policy::FailurePolicy;
pub use pool::WorkerPool;
pub use publish::{ReplyPublisher, SubmissionPublisher};
pub use runner::{Stage, StageWorker, TickReport, DEFAULT_BATCH_SIZE};
pub use text::TextStage;
pub use ticker::{channel, PollSchedule, Shutdown, Ticker};

/// A failed processing attempt. Always counted against the stage budget.
#[derive(Error, Debug)]
pub enum StageError {
    #[error(transparent)]
    Collaborator(#[from] CollabError),

    #[error("Job store error: {0}")]
    Store(#[from] StoreError),

    #[error("Job cannot be processed by this stage: {0}")]
    InvalidJob(String),

    #[error("Stage panicked: {0}")]
    Panicked(String),
}
