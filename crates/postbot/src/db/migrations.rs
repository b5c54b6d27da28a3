//! Schema upgrades for the job database.
//!
//! The applied version lives in SQLite's `user_version` header, so it
//! changes atomically with the schema. Each step runs in its own `IMMEDIATE`
//! transaction and re-reads the version first; a bot and the CLI opening
//! the same file at once apply every step exactly once.

use rusqlite::{Connection, TransactionBehavior};

use super::error::DatabaseError;

struct Step {
    name: &'static str,
    sql: &'static str,
}

/// Step `n` (1-based) moves the schema from version `n - 1` to `n`.
const STEPS: &[Step] = &[
    Step {
        name: "create_jobs_table",
        sql: include_str!("sql/001_create_jobs.sql"),
    },
    Step {
        name: "add_rejection_to_jobs",
        sql: include_str!("sql/002_add_rejection.sql"),
    },
    Step {
        name: "unique_owner_source",
        sql: include_str!("sql/003_unique_source.sql"),
    },
];

/// Schema version this build reads and writes.
pub const LATEST: u32 = STEPS.len() as u32;

pub fn current_version(conn: &Connection) -> Result<u32, DatabaseError> {
    Ok(conn.query_row("PRAGMA user_version", [], |r| r.get(0))?)
}

/// Applies every missing step. Returns how many this call applied.
pub fn run_all(conn: &mut Connection) -> Result<u32, DatabaseError> {
    let mut applied = 0;

    loop {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let version = current_version(&tx)?;
        if version > LATEST {
            return Err(DatabaseError::SchemaMismatch {
                found: version,
                expected: LATEST,
            });
        }
        let Some(step) = STEPS.get(version as usize) else {
            break;
        };

        let next = version + 1;
        log::info!("Migrating job database to v{}: {}", next, step.name);
        tx.execute_batch(step.sql)
            .map_err(|e| DatabaseError::Migration {
                version: next,
                reason: e.to_string(),
            })?;
        tx.pragma_update(None, "user_version", next)?;
        tx.commit()?;
        applied += 1;
    }

    Ok(applied)
}
