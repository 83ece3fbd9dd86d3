// ABOUTME: Owner-filtered batch deletion: fans out one ownership check per id, then deletes once.
// ABOUTME: Exclusions are silent to the caller but recorded in a DeletionReport and in tracing.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::task::TaskTracker;

use crate::error::{StoreError, StoreResult};
use crate::storage::Storage;

/// Tuning knobs for the deletion fan-out.
#[derive(Debug, Clone)]
pub struct DeletionConfig {
    /// Maximum number of ownership checks in flight at once.
    pub max_concurrency: usize,
    /// Deadline for a single ownership lookup.
    pub check_timeout: Duration,
}

impl Default for DeletionConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 16,
            check_timeout: Duration::from_secs(5),
        }
    }
}

/// Result of checking one requested id against the requester's identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Owned by the requester; queued for deletion.
    Owned,
    NotOwned,
    NotFound,
    AlreadyGone,
    LookupFailed(String),
    TimedOut,
    /// The check task never reported back.
    Aborted,
}

impl CheckOutcome {
    fn reason(&self) -> &str {
        match self {
            CheckOutcome::Owned => "owned",
            CheckOutcome::NotOwned => "not owned by requester",
            CheckOutcome::NotFound => "not found",
            CheckOutcome::AlreadyGone => "already deleted",
            CheckOutcome::LookupFailed(_) => "lookup failed",
            CheckOutcome::TimedOut => "lookup timed out",
            CheckOutcome::Aborted => "check aborted",
        }
    }
}

/// Internal account of one deletion request. Never shown to the caller,
/// who only learns that the request was accepted.
#[derive(Debug, Clone, Default)]
pub struct DeletionReport {
    pub outcomes: BTreeMap<u64, CheckOutcome>,
    /// Ids handed to `Storage::delete_batch`, ascending.
    pub submitted: Vec<u64>,
    pub commit_error: Option<StoreError>,
}

impl DeletionReport {
    /// Ids that were dropped from the deletion set, with the reason.
    pub fn excluded(&self) -> impl Iterator<Item = (u64, &CheckOutcome)> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| **outcome != CheckOutcome::Owned)
            .map(|(id, outcome)| (*id, outcome))
    }
}

/// Parse requested id strings. A single malformed id rejects the whole
/// request. Duplicates collapse; the result is ascending.
pub fn parse_ids<S: AsRef<str>>(raw: &[S]) -> StoreResult<Vec<u64>> {
    let mut ids = BTreeSet::new();
    for value in raw {
        let value = value.as_ref().trim();
        let id = value
            .parse::<u64>()
            .map_err(|_| StoreError::Validation(format!("malformed id: {:?}", value)))?;
        ids.insert(id);
    }
    Ok(ids.into_iter().collect())
}

/// Deletes the subset of requested ids that the requester owns.
///
/// Accepted runs are tracked so `shutdown` can let them finish before the
/// runtime goes away.
#[derive(Clone)]
pub struct DeletionPipeline {
    store: Arc<dyn Storage>,
    config: DeletionConfig,
    runs: TaskTracker,
}

impl DeletionPipeline {
    pub fn new(store: Arc<dyn Storage>, config: DeletionConfig) -> Self {
        Self {
            store,
            config,
            runs: TaskTracker::new(),
        }
    }

    pub fn config(&self) -> &DeletionConfig {
        &self.config
    }

    /// Validate the request and start the deletion in the background.
    ///
    /// Returns as soon as the ids parse. Acceptance says nothing about which
    /// ids end up deleted; the handle resolves to the internal report.
    pub fn submit<S: AsRef<str>>(
        &self,
        owner: impl Into<String>,
        raw_ids: &[S],
    ) -> StoreResult<JoinHandle<DeletionReport>> {
        if self.runs.is_closed() {
            return Err(StoreError::BackendUnavailable(
                "deletion pipeline is shutting down".to_string(),
            ));
        }
        let ids = parse_ids(raw_ids)?;
        let pipeline = self.clone();
        let owner = owner.into();
        Ok(self.runs.spawn(async move { pipeline.run(&owner, ids).await }))
    }

    /// Refuse new submissions and wait up to `grace` for accepted runs.
    /// Returns false if some runs were still going when the grace ran out.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.runs.close();
        if !self.runs.is_empty() {
            tracing::info!("waiting for {} deletion run(s) to finish", self.runs.len());
        }

        match tokio::time::timeout(grace, self.runs.wait()).await {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!(
                    "{} deletion run(s) still in flight after {:?}",
                    self.runs.len(),
                    grace
                );
                false
            }
        }
    }

    /// Check every id concurrently, wait for all checks, then issue exactly
    /// one `delete_batch` with the owned ids (possibly none).
    pub async fn run(&self, owner: &str, ids: Vec<u64>) -> DeletionReport {
        let owner: Arc<str> = Arc::from(owner);
        let permits = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut report = DeletionReport::default();
        let mut checks = JoinSet::new();

        for id in ids {
            report.outcomes.insert(id, CheckOutcome::Aborted);

            // Launch only with a permit in hand, so live tasks never exceed the cap.
            let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                continue;
            };
            let store = Arc::clone(&self.store);
            let owner = Arc::clone(&owner);
            let deadline = self.config.check_timeout;

            checks.spawn(async move {
                let outcome = check_ownership(store.as_ref(), &owner, id, deadline).await;
                drop(permit);
                (id, outcome)
            });
        }

        let mut pending = Vec::new();
        while let Some(joined) = checks.join_next().await {
            match joined {
                Ok((id, outcome)) => {
                    if outcome == CheckOutcome::Owned {
                        pending.push(id);
                    } else {
                        tracing::debug!(
                            id,
                            owner = %owner,
                            reason = outcome.reason(),
                            "excluding id from deletion"
                        );
                    }
                    report.outcomes.insert(id, outcome);
                }
                Err(e) => {
                    tracing::warn!("ownership check task failed: {}", e);
                }
            }
        }

        pending.sort_unstable();

        if let Err(e) = self.store.delete_batch(&pending).await {
            tracing::error!(owner = %owner, "deletion batch failed: {}", e);
            report.commit_error = Some(e);
        }

        tracing::info!(
            owner = %owner,
            requested = report.outcomes.len(),
            deleted = pending.len(),
            "deletion request processed"
        );

        report.submitted = pending;
        report
    }
}

async fn check_ownership(
    store: &dyn Storage,
    owner: &str,
    id: u64,
    deadline: Duration,
) -> CheckOutcome {
    match tokio::time::timeout(deadline, store.get(id)).await {
        Err(_) => CheckOutcome::TimedOut,
        Ok(Ok(record)) if record.owner == owner => CheckOutcome::Owned,
        Ok(Ok(_)) => CheckOutcome::NotOwned,
        Ok(Err(StoreError::NotFound)) => CheckOutcome::NotFound,
        Ok(Err(StoreError::Gone(_))) => CheckOutcome::AlreadyGone,
        Ok(Err(e)) => CheckOutcome::LookupFailed(e.to_string()),
    }
}
