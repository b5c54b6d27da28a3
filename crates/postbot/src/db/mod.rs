//! SQLite backing for the job store.
//!
//! A process holds one connection behind a mutex, which is the single
//! writer queue for every worker thread. Writes additionally run inside an
//! `IMMEDIATE` transaction, so the read-check-write done by a save is atomic
//! against other processes (the CLI, a second bot) sharing the file.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{Connection, OpenFlags, TransactionBehavior};

pub mod error;
pub mod job_repo;
pub mod migrations;

pub use error::DatabaseError;

/// How long a statement waits on another process's lock before failing.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadWrite,
    /// Inspection only. Writes fail with [`DatabaseError::ReadOnly`].
    ReadOnly,
}

/// Shared handle to the job database. Clones share the connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    mode: AccessMode,
}

impl Database {
    /// Opens (or creates) the database at `path` and brings its schema up
    /// to date.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DatabaseError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut conn = Connection::open(path)?;
        configure(&conn)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        let applied = migrations::run_all(&mut conn)?;
        log::info!(
            "Job database opened at {} (schema v{}, {} applied now)",
            path.display(),
            migrations::LATEST,
            applied
        );

        Ok(Self::wrap(conn, AccessMode::ReadWrite))
    }

    /// Opens an existing database for inspection while bots may be writing.
    ///
    /// Never migrates. A database whose schema is behind this build is
    /// refused rather than misread.
    pub fn open_read_only(path: &Path) -> Result<Self, DatabaseError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        configure(&conn)?;

        let current = migrations::current_version(&conn)?;
        if current != migrations::LATEST {
            return Err(DatabaseError::SchemaMismatch {
                found: current,
                expected: migrations::LATEST,
            });
        }

        Ok(Self::wrap(conn, AccessMode::ReadOnly))
    }

    /// Opens a private in-memory database with the current schema.
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        let mut conn = Connection::open_in_memory()?;
        configure(&conn)?;
        migrations::run_all(&mut conn)?;
        Ok(Self::wrap(conn, AccessMode::ReadWrite))
    }

    fn wrap(conn: Connection, mode: AccessMode) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            mode,
        }
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    pub fn schema_version(&self) -> Result<u32, DatabaseError> {
        self.read(migrations::current_version)
    }

    /// Runs `f` with the connection locked. For queries.
    pub fn read<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Runs `f` inside an `IMMEDIATE` transaction, committing when it
    /// returns `Ok` and rolling back otherwise.
    pub fn write<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        if self.mode == AccessMode::ReadOnly {
            return Err(DatabaseError::ReadOnly);
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&*tx)?;
        tx.commit()?;
        Ok(value)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, DatabaseError> {
        self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)
    }
}

fn configure(conn: &Connection) -> Result<(), DatabaseError> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    Ok(())
}

/// `~/.postbot/data/postbot.db`, when a home directory is known.
pub fn default_database_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".postbot").join("data").join("postbot.db"))
}

/// Expands a leading `~/` against the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|h| h.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}
