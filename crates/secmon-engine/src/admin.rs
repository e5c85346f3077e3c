//! # Administrative Operations
//!
//! Operator-triggered changes outside the scheduling loop. Unlike pair runs
//! these fail loudly: every error is returned to the caller, and is also
//! written to the exception log under the `admin` source when the store is
//! reachable.

use chrono::{DateTime, Utc};
use secmon_core::{ExceptionEntry, ExceptionSource, Issue, Pair, PollingInterval, TechnologyConfig};
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::context::EngineContext;
use crate::error::AdminError;
use crate::export::ExportSink;
use crate::selector::{resolve_technologies, AccountSelector, NameFilter};

/// Issues removed per pair by [`Admin::delete_unjustified_issues`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeletionReport {
    /// Pairs visited with the number of issues removed from each.
    pub per_pair: Vec<(Pair, u64)>,
    /// Total issues removed.
    pub total: u64,
}

/// Result of an export.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExportReport {
    /// Pairs written.
    pub pairs: usize,
    /// Live resources written.
    pub items: usize,
}

/// Administrative operations over an engine context.
#[derive(Debug, Clone)]
pub struct Admin {
    ctx: EngineContext,
}

impl Admin {
    /// Create an admin facade.
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// Create or replace the polling config of a registered technology.
    pub async fn set_technology_config(
        &self,
        name: &str,
        interval_minutes: u32,
        active: bool,
    ) -> Result<TechnologyConfig, AdminError> {
        let result = self.try_set_technology_config(name, interval_minutes, active).await;
        self.audited("set_technology_config", result).await
    }

    async fn try_set_technology_config(
        &self,
        name: &str,
        interval_minutes: u32,
        active: bool,
    ) -> Result<TechnologyConfig, AdminError> {
        if !self.ctx.registry.contains(name) {
            return Err(AdminError::UnknownTechnology(name.to_string()));
        }
        let interval = PollingInterval::from_minutes(interval_minutes)?;
        let config = TechnologyConfig {
            name: name.to_string(),
            interval,
            active,
        };
        self.ctx.store.upsert_technology_config(&config).await?;
        info!(technology = %name, interval = %interval, active, "Technology config saved");
        Ok(config)
    }

    /// Delete unjustified issues, open or closed, of the selected pairs.
    ///
    /// `All` accounts means every stored account regardless of state;
    /// `All` technologies means every registered technology. Explicit
    /// technology names are used as given so issues of a retired
    /// technology can still be cleared.
    pub async fn delete_unjustified_issues(
        &self,
        accounts: &NameFilter,
        technologies: &NameFilter,
    ) -> Result<DeletionReport, AdminError> {
        let result = self.try_delete_unjustified(accounts, technologies).await;
        self.audited("delete_unjustified_issues", result).await
    }

    async fn try_delete_unjustified(
        &self,
        accounts: &NameFilter,
        technologies: &NameFilter,
    ) -> Result<DeletionReport, AdminError> {
        let accounts = match accounts {
            NameFilter::All => self
                .ctx
                .store
                .list_accounts()
                .await?
                .into_iter()
                .map(|a| a.name)
                .collect(),
            NameFilter::Named(names) => names.clone(),
        };
        let technologies = match technologies {
            NameFilter::All => self.ctx.registry.names(),
            NameFilter::Named(names) => names.clone(),
        };

        let mut report = DeletionReport::default();
        for account in &accounts {
            for technology in &technologies {
                let pair = Pair::new(account.clone(), technology.clone());
                let removed = self.ctx.store.delete_unjustified_issues(&pair).await?;
                if removed > 0 {
                    info!(account = %account, technology = %technology, removed, "Deleted unjustified issues");
                }
                report.total += removed;
                report.per_pair.push((pair, removed));
            }
        }
        Ok(report)
    }

    /// Record an operator justification on an issue.
    pub async fn justify_issue(
        &self,
        id: Uuid,
        justification: &str,
        justified_by: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Issue, AdminError> {
        let result = self.try_justify(id, justification, justified_by, now).await;
        self.audited("justify_issue", result).await
    }

    async fn try_justify(
        &self,
        id: Uuid,
        justification: &str,
        justified_by: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Issue, AdminError> {
        let mut issue = self
            .ctx
            .store
            .issue(id)
            .await?
            .ok_or(AdminError::IssueNotFound(id))?;
        issue.justify(justification, justified_by, now);
        let issue = self
            .ctx
            .store
            .set_issue_justification(&issue)
            .await?
            .ok_or(AdminError::IssueNotFound(id))?;
        info!(issue = %id, key = %issue.key(), "Issue justified");
        Ok(issue)
    }

    /// Withdraw the justification of an issue.
    pub async fn unjustify_issue(&self, id: Uuid) -> Result<Issue, AdminError> {
        let result = self.try_unjustify(id).await;
        self.audited("unjustify_issue", result).await
    }

    async fn try_unjustify(&self, id: Uuid) -> Result<Issue, AdminError> {
        let mut issue = self
            .ctx
            .store
            .issue(id)
            .await?
            .ok_or(AdminError::IssueNotFound(id))?;
        issue.unjustify();
        let issue = self
            .ctx
            .store
            .set_issue_justification(&issue)
            .await?
            .ok_or(AdminError::IssueNotFound(id))?;
        info!(issue = %id, "Issue justification withdrawn");
        Ok(issue)
    }

    /// Remove exception-log entries that have expired at `now`.
    pub async fn purge_expired_exceptions(&self, now: DateTime<Utc>) -> Result<u64, AdminError> {
        let result = self
            .ctx
            .store
            .purge_expired_exceptions(now)
            .await
            .map_err(AdminError::from);
        if let Ok(removed) = &result {
            info!(removed, "Purged expired exception log entries");
        }
        self.audited("purge_expired_exceptions", result).await
    }

    /// Export the latest live revisions of the selected pairs to `sink`.
    /// `All` accounts means active first-party accounts.
    pub async fn export_latest(
        &self,
        accounts: &NameFilter,
        technologies: &NameFilter,
        sink: &dyn ExportSink,
    ) -> Result<ExportReport, AdminError> {
        let result = self.try_export(accounts, technologies, sink).await;
        self.audited("export_latest", result).await
    }

    async fn try_export(
        &self,
        accounts: &NameFilter,
        technologies: &NameFilter,
        sink: &dyn ExportSink,
    ) -> Result<ExportReport, AdminError> {
        let accounts = AccountSelector::new(self.ctx.store.clone())
            .resolve(accounts, true)
            .await?;
        let technologies = resolve_technologies(technologies, &self.ctx.registry);

        let mut report = ExportReport::default();
        for account in &accounts {
            for technology in &technologies {
                let pair = Pair::new(account.clone(), technology.clone());
                let latest: Vec<_> = self
                    .ctx
                    .store
                    .latest_revisions(&pair)
                    .await?
                    .into_iter()
                    .filter(|r| r.is_active())
                    .collect();
                if latest.is_empty() {
                    continue;
                }
                sink.write_pair(&pair, &latest)?;
                report.pairs += 1;
                report.items += latest.len();
            }
        }
        info!(pairs = report.pairs, items = report.items, "Export complete");
        Ok(report)
    }

    /// Log a failed operation and record it before handing it back.
    async fn audited<T>(
        &self,
        operation: &str,
        result: Result<T, AdminError>,
    ) -> Result<T, AdminError> {
        if let Err(e) = &result {
            error!(operation, error = %e, "Administrative operation failed");
            let entry = ExceptionEntry::new(
                ExceptionSource::Admin,
                operation,
                e.to_string(),
                Utc::now(),
                self.ctx.config.exception_ttl(),
            );
            if let Err(store_err) = self.ctx.store.append_exception(&entry).await {
                error!(error = %store_err, "Could not record administrative failure");
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use secmon_core::{Account, AccountSpec, CollectedItem, Finding, ItemRevision, Severity, ValidationError};
    use secmon_store::{Datastore, MemoryStore};
    use serde_json::json;

    use crate::config::EngineConfig;
    use crate::error::CollectorError;
    use crate::export::JsonDirectorySink;
    use crate::registry::{TechnologyRegistry, Watcher};

    struct NoItems;

    #[async_trait]
    impl Watcher for NoItems {
        async fn fetch(&self, _account: &Account) -> Result<Vec<CollectedItem>, CollectorError> {
            Ok(Vec::new())
        }
    }

    fn admin() -> (Admin, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let registry = TechnologyRegistry::builder()
            .watcher("s3", Arc::new(NoItems))
            .build()
            .unwrap();
        let ctx = EngineContext::new(store.clone(), Arc::new(registry), EngineConfig::default());
        (Admin::new(ctx), store)
    }

    #[tokio::test]
    async fn technology_config_is_validated() {
        let (admin, store) = admin();
        let err = admin.set_technology_config("iam", 60, true).await.unwrap_err();
        assert!(matches!(err, AdminError::UnknownTechnology(_)));

        let err = admin.set_technology_config("s3", 45, true).await.unwrap_err();
        assert!(matches!(
            err,
            AdminError::Validation(ValidationError::InvalidInterval(45))
        ));

        let saved = admin.set_technology_config("s3", 720, false).await.unwrap();
        assert_eq!(saved.interval, PollingInterval::TwelveHours);
        assert!(!saved.active);

        // Both rejections were recorded.
        let logged = store.list_exceptions(10).await.unwrap();
        assert_eq!(logged.len(), 2);
        assert!(logged.iter().all(|e| e.source == ExceptionSource::Admin));
    }

    #[tokio::test]
    async fn justify_and_unjustify() {
        let (admin, store) = admin();
        let issue = Issue::open(
            &Pair::new("prod", "s3"),
            "acl",
            Finding::new("bucket", "public", Severity::High, "public bucket"),
            Utc::now(),
        );
        store.upsert_issue(&issue).await.unwrap();

        let justified = admin
            .justify_issue(issue.id, "static website", Some("ops".into()), Utc::now())
            .await
            .unwrap();
        assert!(justified.justified);
        assert_eq!(
            store.issue(issue.id).await.unwrap().unwrap().justification.as_deref(),
            Some("static website")
        );

        let cleared = admin.unjustify_issue(issue.id).await.unwrap();
        assert!(!cleared.justified);

        let missing = admin
            .justify_issue(Uuid::new_v4(), "x", None, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(missing, AdminError::IssueNotFound(_)));
    }

    #[tokio::test]
    async fn delete_unjustified_honours_filters() {
        let (admin, store) = admin();
        let now = Utc::now();
        for account in ["prod", "dev"] {
            let issue = Issue::open(
                &Pair::new(account, "s3"),
                "acl",
                Finding::new("bucket", "public", Severity::High, "public"),
                now,
            );
            store.upsert_issue(&issue).await.unwrap();
        }
        let report = admin
            .delete_unjustified_issues(&NameFilter::parse("prod"), &NameFilter::All)
            .await
            .unwrap();
        assert_eq!(report.total, 1);
        assert!(store
            .issues(&Pair::new("prod", "s3"), None)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            store.issues(&Pair::new("dev", "s3"), None).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn export_writes_active_pairs_only() {
        let (admin, store) = admin();
        let now = Utc::now();
        store
            .upsert_account(&AccountSpec::new("1", "prod").into_account(now))
            .await
            .unwrap();
        let pair = Pair::new("prod", "s3");
        store
            .append_revisions(&[ItemRevision::observed(
                &pair,
                CollectedItem::new("bucket", json!({"acl": "private"})),
                "d".into(),
                now,
            )])
            .await
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let sink = JsonDirectorySink::new(dir.path());
        let report = admin
            .export_latest(&NameFilter::All, &NameFilter::All, &sink)
            .await
            .unwrap();
        assert_eq!(report, ExportReport { pairs: 1, items: 1 });
        assert!(dir.path().join("prod").join("s3.json").exists());
    }
}
