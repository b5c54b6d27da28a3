pub mod broadcast;
pub mod collab;
pub mod config;
pub mod db;
pub mod error;
pub mod filter;
pub mod ingest;
pub mod job;
pub mod runtime;
pub mod store;
pub mod tagging;
pub mod worker;

pub use broadcast::{JobEvent, JobEventBroadcaster};
pub use config::{load_config, BotConfig, Config};
pub use db::{Database, DatabaseError};
pub use error::{ConfigError, PostbotError, Result, StoreError, WorkerError};
pub use job::{
    derive, derive_with, ImageRequest, Job, JobId, JobStatus, NewJob, RetryBudgets, SourceId,
    StageKind, StageOutcome, StageOutput, StageQuery, TextParams, TextRequest,
};
pub use runtime::{start, BotCollaborators};
pub use store::JobStore;
pub use tagging::TagFormatter;
pub use worker::{FailurePolicy, PollSchedule, Stage, StageError, StageWorker, WorkerPool};
