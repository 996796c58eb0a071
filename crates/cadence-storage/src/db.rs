//! SQLite handle for session state.
//!
//! One connection behind a mutex; every statement runs inside `with_conn`.
//! A fresh execution context may open the file while the previous one is
//! still closing it, so writers wait on the lock instead of failing.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::Connection;
use tracing::info;

use cadence_core::error::CadenceError;

use crate::migrations;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create the database file, creating parent directories and
    /// applying pending migrations.
    pub fn new(path: &Path) -> Result<Self, CadenceError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(|e| storage("open database", e))?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")
            .map_err(|e| storage("set pragmas", e))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| storage("set busy timeout", e))?;
        info!(path = %path.display(), "Session database opened");
        Self::migrated(conn)
    }

    /// Private in-memory database; state is lost when it is dropped.
    pub fn in_memory() -> Result<Self, CadenceError> {
        let conn = Connection::open_in_memory().map_err(|e| storage("open in-memory database", e))?;
        Self::migrated(conn)
    }

    fn migrated(conn: Connection) -> Result<Self, CadenceError> {
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.with_conn(migrations::run_migrations)?;
        Ok(db)
    }

    /// Run `f` with the connection locked.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, CadenceError>
    where
        F: FnOnce(&Connection) -> Result<T, CadenceError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|_| CadenceError::Storage("database lock poisoned".to_string()))?;
        f(&conn)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

pub(crate) fn storage(what: &str, err: rusqlite::Error) -> CadenceError {
    CadenceError::Storage(format!("Failed to {}: {}", what, err))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_rows(db: &Database) -> i64 {
        db.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM session_state", [], |row| row.get(0))
                .map_err(|e| CadenceError::Storage(e.to_string()))
        })
        .unwrap()
    }

    #[test]
    fn test_in_memory_database() {
        let db = Database::in_memory().unwrap();
        assert_eq!(count_rows(&db), 0);
    }

    #[test]
    fn test_file_database_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.db");
        let db = Database::new(&path).unwrap();
        assert_eq!(count_rows(&db), 0);
        assert!(path.exists());
    }

    #[test]
    fn test_wal_mode_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(&dir.path().join("wal.db")).unwrap();
        db.with_conn(|conn| {
            let mode: String = conn
                .query_row("PRAGMA journal_mode", [], |row| row.get(0))
                .map_err(|e| CadenceError::Storage(e.to_string()))?;
            assert_eq!(mode, "wal");
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_reopen_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");
        drop(Database::new(&path).unwrap());
        let db = Database::new(&path).unwrap();
        assert_eq!(count_rows(&db), 0);
    }
}
