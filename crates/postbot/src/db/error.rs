//! Database error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from database operations.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// SQLite error from rusqlite.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error when creating directories or files.
    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A migration failed to apply.
    #[error("Migration failed at version {version}: {reason}")]
    Migration { version: u32, reason: String },

    /// The database lock was poisoned.
    #[error("Database lock poisoned")]
    LockPoisoned,

    /// A JSON column could not be encoded or decoded.
    #[error("JSON column '{column}' is invalid: {source}")]
    Serialization {
        column: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// A write was attempted through a read-only handle.
    #[error("Database was opened read-only")]
    ReadOnly,

    /// The file's schema is not the one this build reads and writes.
    #[error("Database schema is v{found}, expected v{expected}; run `postbot migrate`")]
    SchemaMismatch { found: u32, expected: u32 },

    /// A row holds a value the job model cannot represent.
    #[error("Corrupt job row {id}: {reason}")]
    CorruptRow { id: i64, reason: String },
}

impl DatabaseError {
    /// True when a unique index, such as `(owner, source_id)`, refused the
    /// write. Other constraint failures (CHECK, triggers) are not included.
    pub fn is_unique_violation(&self) -> bool {
        matches!(
            self,
            DatabaseError::Sqlite(rusqlite::Error::SqliteFailure(failure, _))
                if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        )
    }
}
