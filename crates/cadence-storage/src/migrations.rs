//! Versioned schema for the session database.

use rusqlite::Connection;
use tracing::info;

use cadence_core::error::CadenceError;

use crate::db::storage;

/// `(version, name, sql)`, applied in order. Append only.
const MIGRATIONS: &[(i64, &str, &str)] = &[(
    1,
    "session_state",
    "CREATE TABLE IF NOT EXISTS session_state (
        session_id  TEXT NOT NULL,
        key         TEXT NOT NULL,
        value       TEXT NOT NULL,
        updated_at  INTEGER NOT NULL,
        PRIMARY KEY (session_id, key)
    );
    CREATE INDEX IF NOT EXISTS idx_session_state_updated
        ON session_state (updated_at);",
)];

/// Bring the schema up to the latest version.
pub fn run_migrations(conn: &Connection) -> Result<(), CadenceError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| storage("create migrations table", e))?;

    let current: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| storage("read schema version", e))?;

    for &(version, name, sql) in MIGRATIONS.iter().filter(|(v, _, _)| *v > current) {
        conn.execute_batch(sql)
            .map_err(|e| storage(&format!("apply migration v{}", version), e))?;
        conn.execute(
            "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
            rusqlite::params![version, name],
        )
        .map_err(|e| storage(&format!("record migration v{}", version), e))?;
        info!(version, name, "Applied migration");
    }
    Ok(())
}
