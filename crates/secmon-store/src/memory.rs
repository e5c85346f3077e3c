//! # In-Memory Store
//!
//! A [`Datastore`] over `parking_lot` maps. Locks are never held across an
//! `.await`, and every operation that must be atomic runs under a single
//! write guard.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use secmon_core::{
    Account, ExceptionEntry, Issue, IssueStatus, ItemRevision, LastRun, Pair, TechnologyConfig,
};
use uuid::Uuid;

use crate::{Datastore, StoreError};

// -- Generic table ------------------------------------------------------------

/// Thread-safe, cloneable key-value table.
#[derive(Debug)]
pub(crate) struct Table<K, V> {
    data: Arc<RwLock<HashMap<K, V>>>,
}

impl<K, V> Clone for Table<K, V> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
        }
    }
}

impl<K, V> Default for Table<K, V> {
    fn default() -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<K: Eq + Hash, V: Clone> Table<K, V> {
    pub(crate) fn get(&self, key: &K) -> Option<V> {
        self.data.read().get(key).cloned()
    }

    pub(crate) fn insert(&self, key: K, value: V) -> Option<V> {
        self.data.write().insert(key, value)
    }

    pub(crate) fn values(&self) -> Vec<V> {
        self.data.read().values().cloned().collect()
    }

    /// Run `f` over the whole map under the read lock.
    pub(crate) fn read<R>(&self, f: impl FnOnce(&HashMap<K, V>) -> R) -> R {
        f(&self.data.read())
    }

    /// Run `f` over the whole map under one write lock.
    pub(crate) fn write<R>(&self, f: impl FnOnce(&mut HashMap<K, V>) -> R) -> R {
        f(&mut self.data.write())
    }
}

// -- MemoryStore --------------------------------------------------------------

/// In-memory [`Datastore`]. Cloning shares the underlying tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    accounts: Table<String, Account>,
    technologies: Table<String, TechnologyConfig>,
    revisions: Table<Pair, Vec<ItemRevision>>,
    issues: Table<Uuid, Issue>,
    last_runs: Table<Pair, LastRun>,
    exceptions: Table<Uuid, ExceptionEntry>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Datastore for MemoryStore {
    async fn list_accounts(&self) -> Result<Vec<Account>, StoreError> {
        let mut accounts = self.accounts.values();
        accounts.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(accounts)
    }

    async fn account_by_name(&self, name: &str) -> Result<Option<Account>, StoreError> {
        Ok(self
            .accounts
            .read(|map| map.values().find(|a| a.name == name).cloned()))
    }

    async fn account_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<Account>, StoreError> {
        Ok(self.accounts.get(&identifier.to_string()))
    }

    async fn upsert_account(&self, account: &Account) -> Result<(), StoreError> {
        self.accounts.write(|map| {
            let clash = map
                .values()
                .any(|a| a.name == account.name && a.identifier != account.identifier);
            if clash {
                return Err(StoreError::Conflict(format!(
                    "account name '{}' is already used by another identifier",
                    account.name
                )));
            }
            map.insert(account.identifier.clone(), account.clone());
            Ok(())
        })
    }

    async fn technology_config(
        &self,
        name: &str,
    ) -> Result<Option<TechnologyConfig>, StoreError> {
        Ok(self.technologies.get(&name.to_string()))
    }

    async fn list_technology_configs(&self) -> Result<Vec<TechnologyConfig>, StoreError> {
        let mut configs = self.technologies.values();
        configs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(configs)
    }

    async fn upsert_technology_config(&self, config: &TechnologyConfig) -> Result<(), StoreError> {
        self.technologies.insert(config.name.clone(), config.clone());
        Ok(())
    }

    async fn latest_revisions(&self, pair: &Pair) -> Result<Vec<ItemRevision>, StoreError> {
        Ok(self.revisions.read(|map| {
            let mut latest: HashMap<&str, &ItemRevision> = HashMap::new();
            for rev in map.get(pair).into_iter().flatten() {
                latest.insert(rev.resource_key.as_str(), rev);
            }
            let mut out: Vec<ItemRevision> = latest.into_values().cloned().collect();
            out.sort_by(|a, b| a.resource_key.cmp(&b.resource_key));
            out
        }))
    }

    async fn revision_history(
        &self,
        pair: &Pair,
        resource_key: &str,
    ) -> Result<Vec<ItemRevision>, StoreError> {
        Ok(self.revisions.read(|map| {
            map.get(pair)
                .into_iter()
                .flatten()
                .filter(|r| r.resource_key == resource_key)
                .cloned()
                .collect()
        }))
    }

    async fn append_revisions(&self, revisions: &[ItemRevision]) -> Result<(), StoreError> {
        self.revisions.write(|map| {
            for rev in revisions {
                map.entry(rev.pair()).or_default().push(rev.clone());
            }
        });
        Ok(())
    }

    async fn issues(
        &self,
        pair: &Pair,
        status: Option<IssueStatus>,
    ) -> Result<Vec<Issue>, StoreError> {
        let mut out: Vec<Issue> = self.issues.read(|map| {
            map.values()
                .filter(|i| i.account == pair.account && i.technology == pair.technology)
                .filter(|i| status.map(|s| i.status == s).unwrap_or(true))
                .cloned()
                .collect()
        });
        out.sort_by(|a, b| a.key().cmp(&b.key()).then(a.first_seen.cmp(&b.first_seen)));
        Ok(out)
    }

    async fn issue(&self, id: Uuid) -> Result<Option<Issue>, StoreError> {
        Ok(self.issues.get(&id))
    }

    async fn upsert_issue(&self, issue: &Issue) -> Result<(), StoreError> {
        self.issues.write(|map| {
            reject_second_open(map, issue)?;
            map.insert(issue.id, issue.clone());
            Ok(())
        })
    }

    async fn refresh_issue(&self, issue: &Issue) -> Result<Option<Issue>, StoreError> {
        self.issues.write(|map| {
            reject_second_open(map, issue)?;
            let Some(stored) = map.get_mut(&issue.id) else {
                return Ok(None);
            };
            stored.auditor = issue.auditor.clone();
            stored.severity = issue.severity;
            stored.summary = issue.summary.clone();
            stored.evidence = issue.evidence.clone();
            stored.sub_findings = issue.sub_findings.clone();
            stored.status = issue.status;
            stored.last_seen = issue.last_seen;
            stored.closed_at = issue.closed_at;
            Ok(Some(stored.clone()))
        })
    }

    async fn set_issue_justification(&self, issue: &Issue) -> Result<Option<Issue>, StoreError> {
        Ok(self.issues.write(|map| {
            map.get_mut(&issue.id).map(|stored| {
                stored.justified = issue.justified;
                stored.justification = issue.justification.clone();
                stored.justified_by = issue.justified_by.clone();
                stored.justified_at = issue.justified_at;
                stored.clone()
            })
        }))
    }

    async fn delete_unjustified_issues(&self, pair: &Pair) -> Result<u64, StoreError> {
        Ok(self.issues.write(|map| {
            let before = map.len();
            map.retain(|_, i| {
                i.justified || i.account != pair.account || i.technology != pair.technology
            });
            (before - map.len()) as u64
        }))
    }

    async fn last_run(&self, pair: &Pair) -> Result<Option<LastRun>, StoreError> {
        Ok(self.last_runs.get(pair))
    }

    async fn record_last_run(&self, run: &LastRun) -> Result<(), StoreError> {
        self.last_runs.insert(run.pair.clone(), run.clone());
        Ok(())
    }

    async fn list_last_runs(&self) -> Result<Vec<LastRun>, StoreError> {
        let mut runs = self.last_runs.values();
        runs.sort_by(|a, b| a.pair.cmp(&b.pair));
        Ok(runs)
    }

    async fn append_exception(&self, entry: &ExceptionEntry) -> Result<(), StoreError> {
        self.exceptions.insert(entry.id, entry.clone());
        Ok(())
    }

    async fn list_exceptions(&self, limit: usize) -> Result<Vec<ExceptionEntry>, StoreError> {
        let mut entries = self.exceptions.values();
        entries.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
        entries.truncate(limit);
        Ok(entries)
    }

    async fn purge_expired_exceptions(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        Ok(self.exceptions.write(|map| {
            let before = map.len();
            map.retain(|_, e| !e.is_expired(now));
            (before - map.len()) as u64
        }))
    }
}

/// Fail when writing `issue` would leave two open issues for one key.
fn reject_second_open(map: &HashMap<Uuid, Issue>, issue: &Issue) -> Result<(), StoreError> {
    if !issue.is_open() {
        return Ok(());
    }
    let duplicate = map.values().any(|other| {
        other.id != issue.id
            && other.is_open()
            && other.account == issue.account
            && other.technology == issue.technology
            && other.resource_key == issue.resource_key
            && other.rule_id == issue.rule_id
    });
    if duplicate {
        return Err(StoreError::Conflict(format!(
            "an open issue already exists for {}/{} {}",
            issue.account,
            issue.technology,
            issue.key()
        )));
    }
    Ok(())
}
