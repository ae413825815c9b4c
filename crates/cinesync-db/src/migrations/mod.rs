//! Embedded catalog schema.
//!
//! The schema version is kept in SQLite's `user_version` header field.
//! Entry `n` of [`SCHEMA`] upgrades a database from version `n` to `n + 1`.

use rusqlite::Connection;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Catalog schema version {found} is newer than this build supports ({supported})")]
    TooNew { found: u32, supported: u32 },
}

const SCHEMA: &[&str] = &[include_str!("001_initial.sql")];

/// Schema version this build writes.
pub fn latest_version() -> u32 {
    SCHEMA.len() as u32
}

pub fn schema_version(conn: &Connection) -> Result<u32, MigrationError> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

/// Upgrade the schema to [`latest_version`], one transaction per step.
///
/// Returns the number of steps applied.
pub fn run_migrations(conn: &Connection) -> Result<u32, MigrationError> {
    let current = schema_version(conn)?;
    let latest = latest_version();
    if current > latest {
        return Err(MigrationError::TooNew {
            found: current,
            supported: latest,
        });
    }

    for (step, sql) in SCHEMA.iter().enumerate().skip(current as usize) {
        let version = step as u32 + 1;
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", version)?;
        tx.commit()?;
        tracing::info!(version, "Catalog schema upgraded");
    }

    Ok(latest - current)
}
