//! Embedded schema steps for the iFilm database.
//!
//! The schema version lives in SQLite's `user_version` pragma. Each step runs
//! in its own transaction together with the version bump, so a failed step
//! leaves the database at the previous version.

use rusqlite::Connection;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Schema step {version} ({name}) failed: {source}")]
    Step {
        version: u32,
        name: &'static str,
        source: rusqlite::Error,
    },
}

/// Ordered schema steps. Versions start at 1 and have no gaps.
const STEPS: &[(u32, &str, &str)] = &[(1, "configs and libraries", include_str!("001_initial.sql"))];

/// Version the embedded steps bring a database to.
pub const SCHEMA_VERSION: u32 = STEPS.len() as u32;

/// Schema version recorded in the database.
pub fn schema_version(conn: &Connection) -> Result<u32, MigrationError> {
    Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
}

/// Apply every step newer than the recorded version. Returns how many ran.
pub fn run_migrations(conn: &Connection) -> Result<usize, MigrationError> {
    let from = schema_version(conn)?;
    let mut applied = 0;

    for &(version, name, sql) in STEPS.iter().filter(|(v, _, _)| *v > from) {
        let step_failed = |source| MigrationError::Step { version, name, source };

        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(sql).map_err(step_failed)?;
        tx.pragma_update(None, "user_version", version).map_err(step_failed)?;
        tx.commit().map_err(step_failed)?;
        applied += 1;
    }

    Ok(applied)
}
