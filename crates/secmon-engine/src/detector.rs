//! # Change Detection
//!
//! Runs a pair's watcher and turns its output into new item revisions.
//!
//! For each collected resource the canonical digest (ephemeral paths
//! stripped) is compared with the latest stored revision:
//!
//! - same digest on a live revision: nothing is written;
//! - new resource, changed digest, or a resource coming back after a
//!   tombstone: a live revision is written;
//! - live resource missing from the watcher output: a tombstone is written.
//!
//! All revisions of one run are appended in a single store call.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use secmon_core::{Account, CollectedItem, ItemRevision, Pair};
use tracing::{debug, warn};

use crate::context::EngineContext;
use crate::error::{CollectorError, EngineError};

/// What one detection run produced.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    /// Revisions written by this run, ordered by resource key.
    pub changed: Vec<ItemRevision>,
    /// Latest live revision of every resource present now, ordered by
    /// resource key.
    pub current: Vec<ItemRevision>,
}

impl ChangeSet {
    /// Whether nothing changed.
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty()
    }

    /// Number of tombstones written.
    pub fn deleted(&self) -> usize {
        self.changed.iter().filter(|r| !r.is_active()).count()
    }
}

/// Watches one pair and records its changes.
pub struct ChangeDetector<'a> {
    ctx: &'a EngineContext,
}

impl<'a> ChangeDetector<'a> {
    /// Create a detector over `ctx`.
    pub fn new(ctx: &'a EngineContext) -> Self {
        Self { ctx }
    }

    /// Collect `technology` for `account`, store what changed, and return
    /// the change set.
    pub async fn detect(
        &self,
        account: &Account,
        technology: &str,
        now: DateTime<Utc>,
    ) -> Result<ChangeSet, EngineError> {
        let pair = Pair::new(account.name.clone(), technology);
        let watcher = self
            .ctx
            .registry
            .watcher(technology)
            .ok_or_else(|| CollectorError::Unregistered(technology.to_string()))?;

        let limit = self.ctx.config.watcher_timeout();
        let items = match tokio::time::timeout(limit, watcher.fetch(account)).await {
            Ok(result) => result?,
            Err(_) => return Err(CollectorError::Timeout(limit).into()),
        };

        let collected = index_collected(&pair, items);
        let previous: BTreeMap<String, ItemRevision> = self
            .ctx
            .bounded(self.ctx.store.latest_revisions(&pair))
            .await?
            .into_iter()
            .map(|rev| (rev.resource_key.clone(), rev))
            .collect();

        let ephemeral = watcher.ephemeral_paths();
        let mut changes = ChangeSet::default();
        for (key, item) in collected {
            let digest = item
                .digest(ephemeral)
                .map_err(|source| EngineError::Canonicalization {
                    resource_key: key.clone(),
                    source,
                })?;
            match previous.get(&key) {
                Some(prev) if prev.is_active() && prev.digest == digest => {
                    changes.current.push(prev.clone());
                }
                _ => {
                    let rev = ItemRevision::observed(&pair, item, digest, now);
                    changes.changed.push(rev.clone());
                    changes.current.push(rev);
                }
            }
        }

        let present: Vec<&String> = changes.current.iter().map(|r| &r.resource_key).collect();
        for (key, prev) in &previous {
            if prev.is_active() && present.binary_search(&key).is_err() {
                changes.changed.push(ItemRevision::tombstone(prev, now));
            }
        }
        changes
            .changed
            .sort_by(|a, b| a.resource_key.cmp(&b.resource_key));

        if !changes.changed.is_empty() {
            self.ctx
                .bounded(self.ctx.store.append_revisions(&changes.changed))
                .await?;
        }
        debug!(
            account = %pair.account,
            technology = %pair.technology,
            changed = changes.changed.len(),
            deleted = changes.deleted(),
            present = changes.current.len(),
            "Change detection complete"
        );
        Ok(changes)
    }
}

/// Key collected items by resource key. A watcher that reports one key
/// twice keeps the last occurrence.
fn index_collected(pair: &Pair, items: Vec<CollectedItem>) -> BTreeMap<String, CollectedItem> {
    let mut by_key = BTreeMap::new();
    for item in items {
        if let Some(dup) = by_key.insert(item.resource_key.clone(), item) {
            warn!(
                account = %pair.account,
                technology = %pair.technology,
                resource = %dup.resource_key,
                "Watcher returned a resource twice; keeping the last occurrence"
            );
        }
    }
    by_key
}
