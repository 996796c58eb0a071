//! Cadence storage crate - the durable, session-scoped state store.
//!
//! The runner persists its snapshot here so that it survives destruction
//! of the execution context. Two backends are provided: an in-memory map
//! for tests and embedding, and a WAL-mode SQLite database whose rows are
//! scoped to one user session.

pub mod db;
pub mod migrations;
pub mod store;

pub use db::Database;
pub use store::{load_json, save_json, MemoryStateStore, SqliteStateStore, StateStore};
