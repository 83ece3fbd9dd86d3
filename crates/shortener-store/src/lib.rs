// ABOUTME: Persistence backends implementing the shortener storage contract.
// ABOUTME: Provides the SQLite store, the JSONL-backed memory store, and backend selection.

pub mod backend;
pub mod jsonl;
pub mod memory;
pub mod sqlite;

pub use backend::{BackendConfig, open_backend};
pub use jsonl::{JsonlError, JsonlLog, LogEntry};
pub use memory::MemoryStore;
pub use sqlite::{SqliteError, SqliteStore};
