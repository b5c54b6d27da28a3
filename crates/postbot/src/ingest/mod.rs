//! Producers: the loops that create jobs.

pub mod ingestor;
pub mod probability;
pub mod scheduler;

use thiserror::Error;

use crate::collab::CollabError;
use crate::error::StoreError;

pub use ingestor::{IngestReport, Ingestor};
pub use probability::HeuristicReplyScorer;
pub use scheduler::SubmissionScheduler;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Feed error: {0}")]
    Feed(#[from] CollabError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
