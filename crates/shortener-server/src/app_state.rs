// ABOUTME: Shared application state for the shortener HTTP server.
// ABOUTME: Holds the storage handle, the deletion pipeline built on it, and the short URL prefix.

use std::sync::Arc;

use shortener_core::{DeletionConfig, DeletionPipeline, Storage};

/// Shared application state accessible by all Axum handlers.
pub struct AppState {
    pub store: Arc<dyn Storage>,
    pub deletions: DeletionPipeline,
    pub base_url: String,
}

/// Type alias for the Arc-wrapped state used with Axum's State extractor.
pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(
        store: Arc<dyn Storage>,
        base_url: impl Into<String>,
        deletion: DeletionConfig,
    ) -> Self {
        Self {
            deletions: DeletionPipeline::new(Arc::clone(&store), deletion),
            store,
            base_url: base_url.into(),
        }
    }

    /// The public short URL for a record id.
    pub fn short_url(&self, id: u64) -> String {
        format!("{}/{}", self.base_url, id)
    }
}
