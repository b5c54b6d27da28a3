use std::path::PathBuf;
use thiserror::Error;

use crate::db::DatabaseError;

#[derive(Error, Debug)]
pub enum PostbotError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Job store error: {0}")]
    Store(#[from] StoreError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Invalid keyword '{keyword}' for bot '{bot}': {reason}")]
    InvalidPattern {
        bot: String,
        keyword: String,
        reason: String,
    },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("New-content job for '{owner}' has no origin subject")]
    MissingSubject { owner: String },

    #[error("Job for source '{source_id}' already exists for '{owner}'")]
    Duplicate { owner: String, source_id: String },

    #[error("Job {0} not found")]
    NotFound(i64),
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker '{name}': {source}")]
    SpawnFailed {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,

    #[error("No collaborators configured for bot '{0}'")]
    MissingCollaborators(String),
}

pub type Result<T> = std::result::Result<T, PostbotError>;
