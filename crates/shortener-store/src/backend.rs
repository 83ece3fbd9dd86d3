// ABOUTME: Chooses and opens the configured storage backend behind the shared Storage trait.
// ABOUTME: Supports the SQLite store, the JSONL-backed memory store, and a purely in-memory store.

use std::path::PathBuf;
use std::sync::Arc;

use shortener_core::{Storage, StoreError, StoreResult};

use crate::memory::MemoryStore;
use crate::sqlite::SqliteStore;

/// Which backend to open, and where its data lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    Sqlite { path: PathBuf },
    File { path: PathBuf },
    Memory,
}

/// Open the configured backend. Failing to open is reported as
/// `BackendUnavailable`.
pub fn open_backend(config: &BackendConfig) -> StoreResult<Arc<dyn Storage>> {
    match config {
        BackendConfig::Sqlite { path } => {
            let store = SqliteStore::open(path)
                .map_err(|e| StoreError::BackendUnavailable(e.to_string()))?;
            tracing::info!("using sqlite store at {}", path.display());
            Ok(Arc::new(store))
        }
        BackendConfig::File { path } => {
            let store = MemoryStore::open(path)
                .map_err(|e| StoreError::BackendUnavailable(e.to_string()))?;
            tracing::info!("using memory store with log at {}", path.display());
            Ok(Arc::new(store))
        }
        BackendConfig::Memory => {
            tracing::warn!("using memory store without persistence");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
