// ABOUTME: The storage contract every shortener backend implements.
// ABOUTME: Defines dedup, all-or-nothing batch insert, and idempotent soft delete semantics.

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::record::{BatchItem, Record};

/// Abstract storage backend for shortened URLs.
///
/// Both backends must be observably identical through this trait. Deleted
/// records stay in storage with `deleted = true` and are never physically
/// removed.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Fetch a record by id.
    ///
    /// Fails with `NotFound` for unknown ids and `Gone` for deleted records.
    async fn get(&self, id: u64) -> StoreResult<Record>;

    /// Fetch the live record holding `url`, or `NotFound`.
    async fn get_by_url(&self, url: &str) -> StoreResult<Record>;

    /// All live records owned by `owner`, ascending by id.
    async fn get_by_owner(&self, owner: &str) -> StoreResult<Vec<Record>>;

    /// Create a record and return its id.
    ///
    /// If a live record already holds `url`, nothing is written and the call
    /// fails with `Conflict(existing_id)`. Of two concurrent puts for the same
    /// URL exactly one succeeds.
    async fn put(&self, owner: &str, url: &str) -> StoreResult<u64>;

    /// Insert every item in one atomic unit, in input order.
    ///
    /// Returns the items with `id` filled in. Any failing item, including a
    /// URL conflict, aborts the whole batch with `BatchAborted` and leaves
    /// the store and its id sequence untouched.
    async fn put_batch(&self, items: Vec<BatchItem>) -> StoreResult<Vec<BatchItem>>;

    /// Mark the listed records deleted. Unknown and already-deleted ids are
    /// ignored; an empty slice is a no-op.
    async fn delete_batch(&self, ids: &[u64]) -> StoreResult<()>;

    /// Liveness probe of the underlying connection or file.
    async fn ping(&self) -> StoreResult<()>;
}
