//! Fakes, a fault-injecting store and a harness shared by the engine
//! integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use secmon_core::{
    Account, AccountSpec, CollectedItem, ExceptionEntry, Finding, Issue, IssueStatus, ItemRevision,
    LastRun, Pair, TechnologyConfig,
};
use secmon_engine::{
    Auditor, CollectorError, EngineConfig, EngineContext, EvaluatorError, RunCoordinator,
    TechnologyRegistry,
};
use secmon_store::{Datastore, MemoryStore, StoreError};
use tokio::sync::Notify;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Watcher
// ---------------------------------------------------------------------------

/// Returns scripted items, or fails when told to. Optionally parks inside
/// `fetch` until released so tests can hold a pair in flight.
pub struct FakeWatcher {
    items: Mutex<Result<Vec<CollectedItem>, String>>,
    calls: AtomicUsize,
    park: bool,
    pub entered: Notify,
    pub release: Notify,
}

impl FakeWatcher {
    pub fn returning(items: Vec<CollectedItem>) -> Arc<Self> {
        Arc::new(Self {
            items: Mutex::new(Ok(items)),
            calls: AtomicUsize::new(0),
            park: false,
            entered: Notify::new(),
            release: Notify::new(),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        let watcher = Self::returning(Vec::new());
        watcher.fail(message);
        watcher
    }

    pub fn parking(items: Vec<CollectedItem>) -> Arc<Self> {
        Arc::new(Self {
            items: Mutex::new(Ok(items)),
            calls: AtomicUsize::new(0),
            park: true,
            entered: Notify::new(),
            release: Notify::new(),
        })
    }

    pub fn set(&self, items: Vec<CollectedItem>) {
        *self.items.lock() = Ok(items);
    }

    pub fn fail(&self, message: &str) {
        *self.items.lock() = Err(message.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl secmon_engine::Watcher for FakeWatcher {
    async fn fetch(&self, _account: &Account) -> Result<Vec<CollectedItem>, CollectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.park {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.items.lock().clone().map_err(CollectorError::Failed)
    }
}

// ---------------------------------------------------------------------------
// Auditor
// ---------------------------------------------------------------------------

/// Reports scripted findings, or fails when told to. A hanging auditor
/// never returns.
pub struct FakeAuditor {
    name: &'static str,
    findings: Mutex<Result<Vec<Finding>, String>>,
    hang: bool,
}

impl FakeAuditor {
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            findings: Mutex::new(Ok(Vec::new())),
            hang: false,
        })
    }

    pub fn hanging(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            findings: Mutex::new(Ok(Vec::new())),
            hang: true,
        })
    }

    pub fn report(&self, findings: Vec<Finding>) {
        *self.findings.lock() = Ok(findings);
    }

    pub fn fail(&self, message: &str) {
        *self.findings.lock() = Err(message.to_string());
    }
}

#[async_trait]
impl Auditor for FakeAuditor {
    fn name(&self) -> &str {
        self.name
    }

    async fn evaluate(&self, _items: &[ItemRevision]) -> Result<Vec<Finding>, EvaluatorError> {
        if self.hang {
            std::future::pending::<()>().await;
        }
        self.findings.lock().clone().map_err(EvaluatorError::Failed)
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Something another actor does to the store while a reconciliation holds
/// its read of the open issues.
#[derive(Debug, Clone)]
pub enum Interference {
    /// An operator justifies every open issue of the pair.
    Justify(String),
    /// An operator deletes the pair's unjustified issues.
    DeleteUnjustified,
}

/// [`MemoryStore`] with switchable faults.
#[derive(Default)]
pub struct FaultyStore {
    inner: MemoryStore,
    fail_appends: AtomicBool,
    after_open_read: Mutex<Option<Interference>>,
}

impl FaultyStore {
    /// Make every `append_revisions` call fail.
    pub fn fail_appends(&self) {
        self.fail_appends.store(true, Ordering::SeqCst);
    }

    /// Apply `interference` once, right after the next read of a pair's
    /// open issues. The caller still receives what it read.
    pub fn interfere_after_open_read(&self, interference: Interference) {
        *self.after_open_read.lock() = Some(interference);
    }
}

#[async_trait]
impl Datastore for FaultyStore {
    async fn list_accounts(&self) -> Result<Vec<Account>, StoreError> {
        self.inner.list_accounts().await
    }

    async fn account_by_name(&self, name: &str) -> Result<Option<Account>, StoreError> {
        self.inner.account_by_name(name).await
    }

    async fn account_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<Account>, StoreError> {
        self.inner.account_by_identifier(identifier).await
    }

    async fn upsert_account(&self, account: &Account) -> Result<(), StoreError> {
        self.inner.upsert_account(account).await
    }

    async fn technology_config(&self, name: &str) -> Result<Option<TechnologyConfig>, StoreError> {
        self.inner.technology_config(name).await
    }

    async fn list_technology_configs(&self) -> Result<Vec<TechnologyConfig>, StoreError> {
        self.inner.list_technology_configs().await
    }

    async fn upsert_technology_config(&self, config: &TechnologyConfig) -> Result<(), StoreError> {
        self.inner.upsert_technology_config(config).await
    }

    async fn latest_revisions(&self, pair: &Pair) -> Result<Vec<ItemRevision>, StoreError> {
        self.inner.latest_revisions(pair).await
    }

    async fn revision_history(
        &self,
        pair: &Pair,
        resource_key: &str,
    ) -> Result<Vec<ItemRevision>, StoreError> {
        self.inner.revision_history(pair, resource_key).await
    }

    async fn append_revisions(&self, revisions: &[ItemRevision]) -> Result<(), StoreError> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(StoreError::corrupt("item_revisions", "disk full"));
        }
        self.inner.append_revisions(revisions).await
    }

    async fn issues(
        &self,
        pair: &Pair,
        status: Option<IssueStatus>,
    ) -> Result<Vec<Issue>, StoreError> {
        let read = self.inner.issues(pair, status).await?;
        if status == Some(IssueStatus::Open) {
            let pending = self.after_open_read.lock().take();
            match pending {
                Some(Interference::Justify(text)) => {
                    for issue in &read {
                        let mut accepted = issue.clone();
                        accepted.justify(text.clone(), Some("ops".into()), Utc::now());
                        self.inner.set_issue_justification(&accepted).await?;
                    }
                }
                Some(Interference::DeleteUnjustified) => {
                    self.inner.delete_unjustified_issues(pair).await?;
                }
                None => {}
            }
        }
        Ok(read)
    }

    async fn issue(&self, id: Uuid) -> Result<Option<Issue>, StoreError> {
        self.inner.issue(id).await
    }

    async fn upsert_issue(&self, issue: &Issue) -> Result<(), StoreError> {
        self.inner.upsert_issue(issue).await
    }

    async fn refresh_issue(&self, issue: &Issue) -> Result<Option<Issue>, StoreError> {
        self.inner.refresh_issue(issue).await
    }

    async fn set_issue_justification(&self, issue: &Issue) -> Result<Option<Issue>, StoreError> {
        self.inner.set_issue_justification(issue).await
    }

    async fn delete_unjustified_issues(&self, pair: &Pair) -> Result<u64, StoreError> {
        self.inner.delete_unjustified_issues(pair).await
    }

    async fn last_run(&self, pair: &Pair) -> Result<Option<LastRun>, StoreError> {
        self.inner.last_run(pair).await
    }

    async fn record_last_run(&self, run: &LastRun) -> Result<(), StoreError> {
        self.inner.record_last_run(run).await
    }

    async fn list_last_runs(&self) -> Result<Vec<LastRun>, StoreError> {
        self.inner.list_last_runs().await
    }

    async fn append_exception(&self, entry: &ExceptionEntry) -> Result<(), StoreError> {
        self.inner.append_exception(entry).await
    }

    async fn list_exceptions(&self, limit: usize) -> Result<Vec<ExceptionEntry>, StoreError> {
        self.inner.list_exceptions(limit).await
    }

    async fn purge_expired_exceptions(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        self.inner.purge_expired_exceptions(now).await
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub store: Arc<FaultyStore>,
    pub ctx: EngineContext,
}

impl Harness {
    /// In-memory store seeded with active first-party accounts.
    pub async fn new(registry: TechnologyRegistry, config: EngineConfig, accounts: &[&str]) -> Self {
        let store = Arc::new(FaultyStore::default());
        let now = Utc::now();
        for (i, name) in accounts.iter().enumerate() {
            let account = AccountSpec::new(format!("{:012}", i + 1), *name).into_account(now);
            store.upsert_account(&account).await.expect("seed account");
        }
        let ctx = EngineContext::new(store.clone(), Arc::new(registry), config);
        Self { store, ctx }
    }

    pub fn coordinator(&self) -> RunCoordinator {
        RunCoordinator::new(self.ctx.clone())
    }
}
