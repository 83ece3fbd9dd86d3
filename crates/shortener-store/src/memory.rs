// ABOUTME: Simple storage backend: an owned in-memory map guarded by a single-writer lock.
// ABOUTME: New records go to a JSONL log replayed at startup; delete flags stay in memory.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use async_trait::async_trait;
use shortener_core::{
    BatchItem, FIRST_ID, Record, Storage, StoreError, StoreResult, validate_fields,
};
use tokio::sync::RwLock;

use crate::jsonl::{JsonlError, JsonlLog, LogEntry};

/// In-memory store, optionally persisted to an append-only record log.
///
/// All mutations hold the write guard for the whole check-then-insert, so
/// the dedup check can never race with another writer.
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

struct MemoryState {
    records: BTreeMap<u64, Record>,
    /// URL -> id of the live (not deleted) record holding it.
    live_urls: HashMap<String, u64>,
    next_id: u64,
    log: Option<JsonlLog>,
}

impl MemoryState {
    fn new(log: Option<JsonlLog>) -> Self {
        Self {
            records: BTreeMap::new(),
            live_urls: HashMap::new(),
            next_id: FIRST_ID,
            log,
        }
    }

    /// Insert a record without logging it. Used for replay and seeding.
    fn restore(&mut self, record: Record) {
        if !record.deleted
            && let Some(previous) = self.live_urls.insert(record.url.clone(), record.id)
            && previous != record.id
        {
            tracing::warn!(
                "url {:?} held by both {} and {}; keeping {}",
                record.url,
                previous,
                record.id,
                record.id
            );
        }
        self.next_id = self.next_id.max(record.id + 1);
        self.records.insert(record.id, record);
    }

    fn ensure_url_free(&self, url: &str) -> StoreResult<()> {
        match self.live_urls.get(url) {
            Some(id) => Err(StoreError::Conflict(*id)),
            None => Ok(()),
        }
    }

    /// Append to the log (if any). Must succeed before anything is published.
    fn persist(&mut self, records: &[Record]) -> Result<(), JsonlError> {
        if let Some(log) = self.log.as_mut() {
            let entries: Vec<LogEntry> = records.iter().map(LogEntry::from).collect();
            log.append_all(&entries)?;
        }
        Ok(())
    }

    fn publish(&mut self, record: Record) {
        self.live_urls.insert(record.url.clone(), record.id);
        self.next_id = self.next_id.max(record.id + 1);
        self.records.insert(record.id, record);
    }
}

impl MemoryStore {
    /// Create an empty store with no durable log.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MemoryState::new(None)),
        }
    }

    /// Create a log-less store pre-populated with the given records.
    /// The next id continues after the highest seeded id.
    pub fn with_records(records: impl IntoIterator<Item = Record>) -> Self {
        let mut state = MemoryState::new(None);
        for record in records {
            state.restore(record);
        }
        Self {
            state: RwLock::new(state),
        }
    }

    /// Open a store backed by the JSONL log at `path`, replaying every entry.
    /// A torn trailing line left by a crash is repaired first.
    pub fn open(path: &Path) -> Result<Self, JsonlError> {
        let entries = if path.exists() {
            JsonlLog::repair(path)?;
            JsonlLog::replay(path)?
        } else {
            Vec::new()
        };

        let log = JsonlLog::open(path)?;
        let mut state = MemoryState::new(Some(log));
        let count = entries.len();
        for entry in entries {
            state.restore(entry.into());
        }

        tracing::info!(
            "loaded {} record(s) from {}, next id {}",
            count,
            path.display(),
            state.next_id
        );

        Ok(Self {
            state: RwLock::new(state),
        })
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for MemoryStore {
    async fn get(&self, id: u64) -> StoreResult<Record> {
        let state = self.state.read().await;
        match state.records.get(&id) {
            None => Err(StoreError::NotFound),
            Some(record) if record.deleted => Err(StoreError::Gone(id)),
            Some(record) => Ok(record.clone()),
        }
    }

    async fn get_by_url(&self, url: &str) -> StoreResult<Record> {
        let state = self.state.read().await;
        state
            .live_urls
            .get(url)
            .and_then(|id| state.records.get(id))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_by_owner(&self, owner: &str) -> StoreResult<Vec<Record>> {
        let state = self.state.read().await;
        Ok(state
            .records
            .values()
            .filter(|r| r.owner == owner && !r.deleted)
            .cloned()
            .collect())
    }

    async fn put(&self, owner: &str, url: &str) -> StoreResult<u64> {
        validate_fields(owner, url)?;

        let mut state = self.state.write().await;
        state.ensure_url_free(url)?;

        let record = Record::new(state.next_id, owner, url);
        state.persist(std::slice::from_ref(&record))?;

        let id = record.id;
        state.publish(record);
        tracing::debug!(id, owner, "created record");
        Ok(id)
    }

    async fn put_batch(&self, mut items: Vec<BatchItem>) -> StoreResult<Vec<BatchItem>> {
        if items.is_empty() {
            return Ok(items);
        }

        let mut state = self.state.write().await;
        let mut next_id = state.next_id;
        let mut staged_urls: HashMap<&str, u64> = HashMap::new();
        let mut staged = Vec::with_capacity(items.len());

        for (index, item) in items.iter().enumerate() {
            validate_fields(&item.owner, &item.url)
                .and_then(|_| state.ensure_url_free(&item.url))
                .map_err(|e| StoreError::abort_batch(index, &e))?;
            if let Some(earlier) = staged_urls.get(item.url.as_str()) {
                return Err(StoreError::abort_batch(index, &StoreError::Conflict(*earlier)));
            }

            staged_urls.insert(item.url.as_str(), next_id);
            staged.push(Record::new(next_id, item.owner.clone(), item.url.clone()));
            next_id += 1;
        }
        drop(staged_urls);

        state.persist(&staged)?;

        for (item, record) in items.iter_mut().zip(staged) {
            item.id = Some(record.id);
            state.publish(record);
        }

        tracing::debug!(count = items.len(), "created record batch");
        Ok(items)
    }

    async fn delete_batch(&self, ids: &[u64]) -> StoreResult<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let mut state = self.state.write().await;
        let state = &mut *state;
        for id in ids {
            if let Some(record) = state.records.get_mut(id)
                && !record.deleted
            {
                record.deleted = true;
                if state.live_urls.get(&record.url) == Some(id) {
                    state.live_urls.remove(&record.url);
                }
            }
        }
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        let state = self.state.read().await;
        if let Some(log) = &state.log {
            if log.is_poisoned() {
                return Err(StoreError::BackendUnavailable(format!(
                    "{} refuses writes",
                    log.path().display()
                )));
            }
            fs::metadata(log.path()).map_err(|e| {
                StoreError::BackendUnavailable(format!("{}: {}", log.path().display(), e))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn create_then_conflict() {
        let store = MemoryStore::new();

        let id = store.put("u1", "a").await.unwrap();
        assert_eq!(id, 1000);

        assert_eq!(store.put("u2", "a").await, Err(StoreError::Conflict(1000)));
        assert_eq!(store.get(1000).await.unwrap().owner, "u1");
        assert_eq!(store.get_by_url("a").await.unwrap().id, 1000);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_puts_create_exactly_one_record() {
        let store = Arc::new(MemoryStore::new());
        let mut tasks = Vec::new();
        for n in 0..8 {
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(async move {
                store.put(&format!("user-{}", n), "https://race.example").await
            }));
        }

        let mut winners = Vec::new();
        let mut conflicts = Vec::new();
        for task in tasks {
            match task.await.unwrap() {
                Ok(id) => winners.push(id),
                Err(StoreError::Conflict(id)) => conflicts.push(id),
                Err(e) => panic!("unexpected error: {}", e),
            }
        }

        assert_eq!(winners.len(), 1);
        assert_eq!(conflicts.len(), 7);
        assert!(conflicts.iter().all(|id| *id == winners[0]));
        assert_eq!(
            store.get_by_url("https://race.example").await.unwrap().id,
            winners[0]
        );
    }

    #[tokio::test]
    async fn batch_assigns_ids_in_order_and_keeps_correlation() {
        let store = MemoryStore::new();
        let items = vec![
            BatchItem::new("first", "u1", "a"),
            BatchItem::new("second", "u1", "b"),
        ];

        let stored = store.put_batch(items).await.unwrap();

        assert_eq!(stored[0].correlation_id, "first");
        assert_eq!(stored[0].id, Some(1000));
        assert_eq!(stored[1].correlation_id, "second");
        assert_eq!(stored[1].id, Some(1001));
        assert_eq!(store.get(1001).await.unwrap().url, "b");
    }

    #[tokio::test]
    async fn batch_conflict_aborts_everything() {
        let store = MemoryStore::new();
        store.put("u1", "a").await.unwrap();

        let items = vec![
            BatchItem::new("1", "u2", "x"),
            BatchItem::new("2", "u2", "a"),
            BatchItem::new("3", "u2", "y"),
        ];
        let err = store.put_batch(items).await.unwrap_err();

        assert!(matches!(err, StoreError::BatchAborted { index: 1, .. }));
        assert_eq!(store.get_by_url("x").await, Err(StoreError::NotFound));
        assert_eq!(store.get_by_url("y").await, Err(StoreError::NotFound));
        assert_eq!(store.get_by_owner("u2").await.unwrap(), Vec::new());
        // No ids were reserved by the failed batch.
        assert_eq!(store.put("u2", "x").await.unwrap(), 1001);
    }

    #[tokio::test]
    async fn batch_with_repeated_url_aborts() {
        let store = MemoryStore::new();
        let items = vec![
            BatchItem::new("1", "u1", "same"),
            BatchItem::new("2", "u1", "same"),
        ];

        let err = store.put_batch(items).await.unwrap_err();

        assert!(matches!(err, StoreError::BatchAborted { index: 1, .. }));
        assert_eq!(store.get_by_url("same").await, Err(StoreError::NotFound));
    }

    #[tokio::test]
    async fn empty_batch_is_a_no_op() {
        let store = MemoryStore::new();
        assert!(store.put_batch(Vec::new()).await.unwrap().is_empty());
        assert_eq!(store.put("u1", "a").await.unwrap(), 1000);
    }

    #[tokio::test]
    async fn delete_is_idempotent_and_terminal() {
        let store = MemoryStore::new();
        let id = store.put("u1", "a").await.unwrap();

        store.delete_batch(&[id]).await.unwrap();
        assert_eq!(store.get(id).await, Err(StoreError::Gone(id)));

        store.delete_batch(&[id]).await.unwrap();
        assert_eq!(store.get(id).await, Err(StoreError::Gone(id)));
        assert_eq!(store.get_by_url("a").await, Err(StoreError::NotFound));
    }

    #[tokio::test]
    async fn delete_ignores_unknown_and_empty() {
        let store = MemoryStore::new();
        let id = store.put("u1", "a").await.unwrap();

        store.delete_batch(&[]).await.unwrap();
        store.delete_batch(&[42, 99_999]).await.unwrap();

        assert_eq!(store.get(id).await.unwrap().url, "a");
        assert_eq!(store.get(42).await, Err(StoreError::NotFound));
    }

    #[tokio::test]
    async fn get_by_owner_isolates_owners_and_hides_deleted() {
        let store = MemoryStore::with_records([
            Record::new(1000, "u1", "a"),
            Record::new(1001, "u1", "b"),
            Record::new(2000, "u2", "c"),
        ]);
        store.delete_batch(&[1001]).await.unwrap();

        let owned = store.get_by_owner("u1").await.unwrap();
        assert_eq!(owned, vec![Record::new(1000, "u1", "a")]);
        assert!(store.get_by_owner("nobody").await.unwrap().is_empty());
        assert_eq!(store.put("u3", "d").await.unwrap(), 2001);
    }

    #[tokio::test]
    async fn deleted_url_can_be_shortened_again() {
        let store = MemoryStore::new();
        let old = store.put("u1", "a").await.unwrap();
        store.delete_batch(&[old]).await.unwrap();

        let new = store.put("u2", "a").await.unwrap();

        assert_ne!(old, new);
        assert_eq!(store.get(old).await, Err(StoreError::Gone(old)));
        assert_eq!(store.get_by_url("a").await.unwrap().id, new);
    }

    #[tokio::test]
    async fn oversized_url_is_rejected() {
        let store = MemoryStore::new();
        let url = "x".repeat(shortener_core::MAX_URL_LEN + 1);
        assert!(matches!(
            store.put("u1", &url).await,
            Err(StoreError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn log_replay_restores_records_and_counter() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("urls.jsonl");

        {
            let store = MemoryStore::open(&path).unwrap();
            store.put("u1", "a").await.unwrap();
            store
                .put_batch(vec![BatchItem::new("c", "u2", "b")])
                .await
                .unwrap();
            store.delete_batch(&[1000]).await.unwrap();
        }

        let store = MemoryStore::open(&path).unwrap();
        assert_eq!(store.get(1001).await.unwrap().owner, "u2");
        // Delete flags are memory-only and come back live after a restart.
        assert_eq!(store.get(1000).await.unwrap().url, "a");
        assert_eq!(store.put("u1", "c").await.unwrap(), 1002);
    }

    #[tokio::test]
    async fn replay_prefers_latest_record_for_reused_url() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("urls.jsonl");

        {
            let store = MemoryStore::open(&path).unwrap();
            store.put("u1", "a").await.unwrap();
            store.delete_batch(&[1000]).await.unwrap();
            store.put("u2", "a").await.unwrap();
        }

        let store = MemoryStore::open(&path).unwrap();
        assert_eq!(store.get_by_url("a").await.unwrap().id, 1001);
    }

    #[tokio::test]
    async fn open_repairs_torn_log() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("urls.jsonl");

        {
            let store = MemoryStore::open(&path).unwrap();
            store.put("u1", "a").await.unwrap();
        }
        let mut file = fs::OpenOptions::new().append(true).open(&path).unwrap();
        write!(file, r#"{{"id":1001,"own"#).unwrap();
        drop(file);

        let store = MemoryStore::open(&path).unwrap();
        assert_eq!(store.get(1000).await.unwrap().url, "a");
        assert_eq!(store.put("u1", "b").await.unwrap(), 1001);

        let reopened = MemoryStore::open(&path).unwrap();
        assert_eq!(reopened.get(1001).await.unwrap().url, "b");
    }

    #[tokio::test]
    async fn ping_fails_when_log_disappears() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("urls.jsonl");
        let store = MemoryStore::open(&path).unwrap();
        store.ping().await.unwrap();

        fs::remove_file(&path).unwrap();

        assert!(matches!(
            store.ping().await,
            Err(StoreError::BackendUnavailable(_))
        ));
        assert!(MemoryStore::new().ping().await.is_ok());
    }
}
