//! Embedded schema migrations.
//!
//! The schema version lives in SQLite's `user_version` header field, so no
//! bookkeeping table is needed. Script `n` in [`SCRIPTS`] upgrades the
//! schema from version `n` to `n + 1`.

use rusqlite::Connection;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Migration to version {version} ({name}) failed: {source}")]
    Failed {
        version: u32,
        name: &'static str,
        source: rusqlite::Error,
    },

    /// The file was written by a newer build.
    #[error("Schema version {found} is newer than supported version {supported}")]
    TooNew { found: u32, supported: u32 },
}

/// Ordered `(name, sql)` upgrade scripts.
const SCRIPTS: &[(&str, &str)] = &[("initial", include_str!("001_initial.sql"))];

/// Schema version this build writes.
pub fn latest_version() -> u32 {
    SCRIPTS.len() as u32
}

/// Schema version recorded in the database file.
pub fn schema_version(conn: &Connection) -> Result<u32, MigrationError> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

/// Bring the schema up to [`latest_version`].
///
/// Each script runs in its own transaction together with the version bump.
/// Returns how many scripts were applied.
pub fn run_migrations(conn: &Connection) -> Result<usize, MigrationError> {
    conn.pragma_update(None, "foreign_keys", true)?;

    let found = schema_version(conn)?;
    let supported = latest_version();
    if found > supported {
        return Err(MigrationError::TooNew { found, supported });
    }

    for (index, &(name, sql)) in SCRIPTS.iter().enumerate().skip(found as usize) {
        let version = index as u32 + 1;
        let failed = |source| MigrationError::Failed {
            version,
            name,
            source,
        };

        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(sql).map_err(failed)?;
        tx.pragma_update(None, "user_version", version)
            .map_err(failed)?;
        tx.commit().map_err(failed)?;

        tracing::info!(version, name, "Applied schema migration");
    }

    Ok((supported - found) as usize)
}
