//! Durable key/value state store.
//!
//! Values are opaque strings (JSON in practice). The store outlives the
//! execution context but is scoped to one user session: starting a new
//! session starts from an empty namespace.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use cadence_core::error::{CadenceError, Result};

use crate::db::Database;

/// Session-scoped key/value persistence.
///
/// Only one execution context is alive per session, so implementations do
/// not need cross-process locking; they only need to be safe to share
/// between tasks of that one context.
pub trait StateStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Read and decode a JSON value. A value that no longer decodes (for
/// instance after a schema change) is treated as absent.
pub fn load_json<T: DeserializeOwned>(store: &dyn StateStore, key: &str) -> Result<Option<T>> {
    let Some(raw) = store.get(key)? else {
        return Ok(None);
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            debug!(key, error = %e, "Discarding undecodable state value");
            Ok(None)
        }
    }
}

/// Encode a value as JSON and store it.
pub fn save_json<T: Serialize>(store: &dyn StateStore, key: &str, value: &T) -> Result<()> {
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw)
}

// =============================================================================
// In-memory backend
// =============================================================================

/// Map-backed store. Clones share the same map, which lets tests hand the
/// "same session" to a second runner instance.
#[derive(Clone, Default)]
pub struct MemoryStateStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|e| CadenceError::Storage(format!("Lock poisoned: {}", e)))
    }
}

impl StateStore for MemoryStateStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}

// =============================================================================
// SQLite backend
// =============================================================================

/// SQLite-backed store whose rows are namespaced by session id.
pub struct SqliteStateStore {
    db: Arc<Database>,
    session_id: String,
}

impl SqliteStateStore {
    /// Open the store for an existing session.
    pub fn new(db: Arc<Database>, session_id: impl Into<String>) -> Self {
        Self {
            db,
            session_id: session_id.into(),
        }
    }

    /// Open the store for a freshly generated session id.
    pub fn new_session(db: Arc<Database>) -> Self {
        Self::new(db, Uuid::new_v4().to_string())
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Keys currently stored for this session, sorted.
    pub fn keys(&self) -> Result<Vec<String>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT key FROM session_state WHERE session_id = ?1 ORDER BY key")
                .map_err(|e| CadenceError::Storage(e.to_string()))?;
            let rows = stmt
                .query_map(rusqlite::params![self.session_id], |row| row.get(0))
                .map_err(|e| CadenceError::Storage(e.to_string()))?;
            let keys = rows
                .collect::<std::result::Result<Vec<String>, _>>()
                .map_err(|e| CadenceError::Storage(e.to_string()))?;
            Ok(keys)
        })
    }

    /// Drop everything stored for this session (end of the user session).
    pub fn clear_session(&self) -> Result<usize> {
        self.db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM session_state WHERE session_id = ?1",
                rusqlite::params![self.session_id],
            )
            .map_err(|e| CadenceError::Storage(format!("Failed to clear session: {}", e)))
        })
    }
}

impl StateStore for SqliteStateStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.db.with_conn(|conn| {
            let result = conn.query_row(
                "SELECT value FROM session_state WHERE session_id = ?1 AND key = ?2",
                rusqlite::params![self.session_id, key],
                |row| row.get(0),
            );
            match result {
                Ok(value) => Ok(Some(value)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(CadenceError::Storage(format!("Failed to read {}: {}", key, e))),
            }
        })
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO session_state (session_id, key, value, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (session_id, key)
                 DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                rusqlite::params![self.session_id, key, value, Utc::now().timestamp()],
            )
            .map_err(|e| CadenceError::Storage(format!("Failed to write {}: {}", key, e)))?;
            Ok(())
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM session_state WHERE session_id = ?1 AND key = ?2",
                rusqlite::params![self.session_id, key],
            )
            .map_err(|e| CadenceError::Storage(format!("Failed to remove {}: {}", key, e)))?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Snapshot {
        phase: String,
        count: u32,
    }

    fn exercise(store: &dyn StateStore) {
        assert_eq!(store.get("missing").unwrap(), None);

        store.set("k", "v1").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v1"));

        store.set("k", "v2").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v2"));

        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);

        // Removing an absent key is not an error.
        store.remove("k").unwrap();
    }

    #[test]
    fn test_memory_store_contract() {
        exercise(&MemoryStateStore::new());
    }

    #[test]
    fn test_sqlite_store_contract() {
        let db = Arc::new(Database::in_memory().unwrap());
        exercise(&SqliteStateStore::new_session(db));
    }

    #[test]
    fn test_memory_store_clones_share_entries() {
        let a = MemoryStateStore::new();
        let b = a.clone();
        a.set("shared", "yes").unwrap();
        assert_eq!(b.get("shared").unwrap().as_deref(), Some("yes"));
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn test_json_helpers() {
        let store = MemoryStateStore::new();
        let snap = Snapshot {
            phase: "polling".into(),
            count: 2,
        };
        save_json(&store, "snap", &snap).unwrap();
        let loaded: Option<Snapshot> = load_json(&store, "snap").unwrap();
        assert_eq!(loaded, Some(snap));
    }

    #[test]
    fn test_load_json_discards_garbage() {
        let store = MemoryStateStore::new();
        store.set("snap", "{not json").unwrap();
        let loaded: Option<Snapshot> = load_json(&store, "snap").unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_sqlite_sessions_are_isolated() {
        let db = Arc::new(Database::in_memory().unwrap());
        let first = SqliteStateStore::new(Arc::clone(&db), "session-a");
        let second = SqliteStateStore::new(Arc::clone(&db), "session-b");

        first.set("runner", "a").unwrap();
        second.set("runner", "b").unwrap();

        assert_eq!(first.get("runner").unwrap().as_deref(), Some("a"));
        assert_eq!(second.get("runner").unwrap().as_deref(), Some("b"));

        assert_eq!(first.clear_session().unwrap(), 1);
        assert_eq!(first.get("runner").unwrap(), None);
        assert_eq!(second.get("runner").unwrap().as_deref(), Some("b"));
    }

    #[test]
    fn test_sqlite_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");

        {
            let db = Arc::new(Database::new(&path).unwrap());
            let store = SqliteStateStore::new(db, "s1");
            store.set("cadence.runner", r#"{"phase":"executing"}"#).unwrap();
        }

        let db = Arc::new(Database::new(&path).unwrap());
        let store = SqliteStateStore::new(db, "s1");
        assert_eq!(
            store.get("cadence.runner").unwrap().as_deref(),
            Some(r#"{"phase":"executing"}"#)
        );
        assert_eq!(store.keys().unwrap(), vec!["cadence.runner".to_string()]);
    }
}
