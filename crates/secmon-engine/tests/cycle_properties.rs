//! # Cycle Integration Tests
//!
//! Drives full cycles through [`RunCoordinator`] against the in-memory store
//! with scripted watchers and auditors.
//!
//! Tests:
//! 1. Re-watching unchanged state writes nothing
//! 2. Repeated findings never duplicate an issue
//! 3. Justifications survive re-detection
//! 4. Findings that disappear close their issue
//! 5. The interval gate is honoured on scheduled cycles
//! 6. A pair never runs in two cycles at once
//! 7. Disabled accounts drop out of `all`
//! 8. One failing pair does not stop the others
//! 9. Repeated failures flag a pair for attention
//! 10. Report delivery failures are logged, not fatal
//! 11. The scheduler drains and stops on shutdown
//! 12. Operator edits made during a reconciliation are kept
//! 13. Watcher and auditor timeouts are contained
//! 14. Store failures fail the pair and are logged
//! 15. Shutdown lets in-flight pairs finish

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::{FakeAuditor, FakeWatcher, Harness, Interference};
use secmon_core::{
    CollectedItem, ExceptionSource, Finding, IssueStatus, LastRun, Pair, PollingInterval,
    RunOutcome, Severity, TechnologyConfig,
};
use secmon_engine::{
    AccountLifecycleManager, Admin, CycleRequest, CycleSummary, EngineConfig, NameFilter,
    ReportError, ReportSink, RunMode, Scheduler, TechnologyRegistry,
};
use secmon_store::Datastore;
use serde_json::json;

fn bucket(key: &str, acl: &str) -> CollectedItem {
    CollectedItem::new(key, json!({ "acl": acl }))
}

fn public_bucket(key: &str) -> Finding {
    Finding::new(key, "s3-public", Severity::High, "Bucket is public")
}

fn forced(account: &str, technology: &str) -> CycleRequest {
    CycleRequest::forced(
        NameFilter::named([account]),
        NameFilter::named([technology]),
    )
}

async fn single_pair(
    watcher: Arc<FakeWatcher>,
    auditor: Arc<FakeAuditor>,
    config: EngineConfig,
) -> Harness {
    let registry = TechnologyRegistry::builder()
        .watcher("s3", watcher)
        .auditor("s3", auditor)
        .build()
        .unwrap();
    Harness::new(registry, config, &["prod"]).await
}

// ---------------------------------------------------------------------------
// 1. Re-watching unchanged state writes nothing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rewatch_of_unchanged_state_is_idempotent() {
    let watcher = FakeWatcher::returning(vec![bucket("a", "private"), bucket("b", "private")]);
    let harness = single_pair(watcher.clone(), FakeAuditor::new("acl"), EngineConfig::default()).await;
    let coordinator = harness.coordinator();

    let first = coordinator.run_cycle(forced("prod", "s3")).await.unwrap();
    assert_eq!(first.succeeded, 1);
    assert_eq!(first.revisions_written, 2);

    let second = coordinator.run_cycle(forced("prod", "s3")).await.unwrap();
    assert_eq!(second.succeeded, 1);
    assert_eq!(second.revisions_written, 0);

    let history = harness
        .store
        .revision_history(&Pair::new("prod", "s3"), "a")
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(watcher.calls(), 2);
}

#[tokio::test]
async fn changed_and_deleted_items_are_recorded() {
    let watcher = FakeWatcher::returning(vec![bucket("a", "private"), bucket("b", "private")]);
    let harness = single_pair(watcher.clone(), FakeAuditor::new("acl"), EngineConfig::default()).await;
    let coordinator = harness.coordinator();
    coordinator.run_cycle(forced("prod", "s3")).await.unwrap();

    watcher.set(vec![bucket("a", "public-read")]);
    let summary = coordinator.run_cycle(forced("prod", "s3")).await.unwrap();
    // one changed, one tombstone
    assert_eq!(summary.revisions_written, 2);

    let latest = harness
        .store
        .latest_revisions(&Pair::new("prod", "s3"))
        .await
        .unwrap();
    let live: Vec<_> = latest.iter().filter(|r| r.is_active()).collect();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].config["acl"], "public-read");
}

// ---------------------------------------------------------------------------
// 2. Repeated findings never duplicate an issue
// ---------------------------------------------------------------------------

#[tokio::test]
async fn repeated_findings_refresh_one_issue() {
    let watcher = FakeWatcher::returning(vec![bucket("a", "public-read")]);
    let auditor = FakeAuditor::new("acl");
    auditor.report(vec![public_bucket("a")]);
    let harness = single_pair(watcher, auditor, EngineConfig::default()).await;
    let coordinator = harness.coordinator();
    let request = forced("prod", "s3").with_audit(true);

    let first = coordinator.run_cycle(request.clone()).await.unwrap();
    assert_eq!(first.issues_opened, 1);
    let second = coordinator.run_cycle(request).await.unwrap();
    assert_eq!(second.issues_opened, 0);
    assert_eq!(second.issues_refreshed, 1);

    let open = harness
        .store
        .issues(&Pair::new("prod", "s3"), Some(IssueStatus::Open))
        .await
        .unwrap();
    assert_eq!(open.len(), 1);
}

// ---------------------------------------------------------------------------
// 3. Justifications survive re-detection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn justification_survives_redetection() {
    let watcher = FakeWatcher::returning(vec![bucket("a", "public-read")]);
    let auditor = FakeAuditor::new("acl");
    auditor.report(vec![public_bucket("a")]);
    let harness = single_pair(watcher, auditor, EngineConfig::default()).await;
    let coordinator = harness.coordinator();
    let request = forced("prod", "s3").with_audit(true);
    let pair = Pair::new("prod", "s3");

    coordinator.run_cycle(request.clone()).await.unwrap();
    let issue = harness.store.issues(&pair, None).await.unwrap().remove(0);
    Admin::new(harness.ctx.clone())
        .justify_issue(issue.id, "static website", Some("ops".into()), Utc::now())
        .await
        .unwrap();

    coordinator.run_cycle(request).await.unwrap();
    let after = harness.store.issue(issue.id).await.unwrap().unwrap();
    assert!(after.is_open());
    assert!(after.justified);
    assert_eq!(after.justification.as_deref(), Some("static website"));
    assert!(after.last_seen >= issue.last_seen);
}

// ---------------------------------------------------------------------------
// 4. Findings that disappear close their issue
// ---------------------------------------------------------------------------

#[tokio::test]
async fn resolved_findings_close_their_issue() {
    let watcher = FakeWatcher::returning(vec![bucket("a", "public-read")]);
    let auditor = FakeAuditor::new("acl");
    auditor.report(vec![public_bucket("a")]);
    let harness = single_pair(watcher.clone(), auditor.clone(), EngineConfig::default()).await;
    let coordinator = harness.coordinator();
    let request = forced("prod", "s3").with_audit(true);
    coordinator.run_cycle(request.clone()).await.unwrap();

    watcher.set(vec![bucket("a", "private")]);
    auditor.report(Vec::new());
    let summary = coordinator.run_cycle(request).await.unwrap();
    assert_eq!(summary.issues_closed, 1);

    let issues = harness.store.issues(&Pair::new("prod", "s3"), None).await.unwrap();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].status, IssueStatus::Closed);
    assert!(issues[0].closed_at.is_some());
}

#[tokio::test]
async fn failing_auditor_keeps_its_issues_open() {
    let watcher = FakeWatcher::returning(vec![bucket("a", "public-read")]);
    let auditor = FakeAuditor::new("acl");
    auditor.report(vec![public_bucket("a")]);
    let harness = single_pair(watcher, auditor.clone(), EngineConfig::default()).await;
    let coordinator = harness.coordinator();
    let request = forced("prod", "s3").with_audit(true);
    coordinator.run_cycle(request.clone()).await.unwrap();

    auditor.fail("rule engine crashed");
    let summary = coordinator.run_cycle(request).await.unwrap();
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.evaluator_failures, 1);
    assert_eq!(summary.issues_closed, 0);

    let open = harness
        .store
        .issues(&Pair::new("prod", "s3"), Some(IssueStatus::Open))
        .await
        .unwrap();
    assert_eq!(open.len(), 1);
    let logged = harness.store.list_exceptions(10).await.unwrap();
    assert!(logged.iter().any(|e| e.source == ExceptionSource::Auditor));
}

// ---------------------------------------------------------------------------
// 5. The interval gate is honoured on scheduled cycles
// ---------------------------------------------------------------------------

async fn scheduled_after(minutes_ago: i64) -> CycleSummary {
    let watcher = FakeWatcher::returning(vec![bucket("a", "private")]);
    let harness = single_pair(watcher, FakeAuditor::new("acl"), EngineConfig::default()).await;
    harness
        .store
        .upsert_technology_config(&TechnologyConfig::new("s3", PollingInterval::Hourly))
        .await
        .unwrap();
    harness
        .store
        .record_last_run(&LastRun {
            pair: Pair::new("prod", "s3"),
            finished_at: Utc::now() - chrono::Duration::minutes(minutes_ago),
            outcome: RunOutcome::Success,
            consecutive_failures: 0,
            needs_attention: false,
            last_error: None,
        })
        .await
        .unwrap();
    harness
        .coordinator()
        .run_cycle(CycleRequest::scheduled().with_report(false))
        .await
        .unwrap()
}

#[tokio::test]
async fn scheduled_cycle_skips_pairs_that_are_not_due() {
    let summary = scheduled_after(30).await;
    assert_eq!(summary.skipped_not_due, 1);
    assert_eq!(summary.attempted, 0);
}

#[tokio::test]
async fn scheduled_cycle_runs_pairs_that_are_due() {
    let summary = scheduled_after(61).await;
    assert_eq!(summary.skipped_not_due, 0);
    assert_eq!(summary.attempted, 1);
    assert_eq!(summary.succeeded, 1);
}

#[tokio::test]
async fn forced_cycle_ignores_the_gate() {
    let watcher = FakeWatcher::returning(vec![bucket("a", "private")]);
    let harness = single_pair(watcher, FakeAuditor::new("acl"), EngineConfig::default()).await;
    let coordinator = harness.coordinator();
    coordinator.run_cycle(forced("prod", "s3")).await.unwrap();

    let request = forced("prod", "s3");
    assert_eq!(request.mode, RunMode::Forced);
    let summary = coordinator.run_cycle(request).await.unwrap();
    assert_eq!(summary.attempted, 1);
}

// ---------------------------------------------------------------------------
// 6. A pair never runs in two cycles at once
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_cycles_never_run_one_pair_twice() {
    let watcher = FakeWatcher::parking(vec![bucket("a", "private")]);
    let harness = single_pair(watcher.clone(), FakeAuditor::new("acl"), EngineConfig::default()).await;
    let coordinator = harness.coordinator();

    let first = tokio::spawn({
        let coordinator = coordinator.clone();
        async move { coordinator.run_cycle(forced("prod", "s3")).await }
    });
    watcher.entered.notified().await;

    let second = coordinator.run_cycle(forced("prod", "s3")).await.unwrap();
    assert_eq!(second.skipped_in_flight, 1);
    assert_eq!(second.attempted, 0);

    watcher.release.notify_one();
    let first = first.await.unwrap().unwrap();
    assert_eq!(first.succeeded, 1);
    assert_eq!(first.revisions_written, 1);
    assert_eq!(watcher.calls(), 1);
    assert!(harness.ctx.locks.is_empty());
}

// ---------------------------------------------------------------------------
// 7. Disabled accounts drop out of `all`
// ---------------------------------------------------------------------------

#[tokio::test]
async fn disabled_accounts_are_not_selected() {
    let registry = TechnologyRegistry::builder()
        .watcher("s3", FakeWatcher::returning(vec![bucket("a", "private")]))
        .build()
        .unwrap();
    let harness = Harness::new(registry, EngineConfig::default(), &["dev", "prod", "stage"]).await;

    let report = AccountLifecycleManager::new(harness.store.clone())
        .set_active(&["dev".to_string(), "stage".to_string()], false, Utc::now())
        .await
        .unwrap();
    assert_eq!(report.changed.len(), 2);

    let summary = harness
        .coordinator()
        .run_cycle(CycleRequest::forced(NameFilter::All, NameFilter::All))
        .await
        .unwrap();
    assert_eq!(summary.attempted, 1);
    let runs = harness.store.list_last_runs().await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].pair, Pair::new("prod", "s3"));
}

#[tokio::test]
async fn unknown_accounts_are_skipped() {
    let watcher = FakeWatcher::returning(Vec::new());
    let harness = single_pair(watcher.clone(), FakeAuditor::new("acl"), EngineConfig::default()).await;
    let summary = harness
        .coordinator()
        .run_cycle(forced("missing", "s3"))
        .await
        .unwrap();
    assert_eq!(summary.skipped_missing_account, 1);
    assert_eq!(summary.attempted, 0);
    assert_eq!(watcher.calls(), 0);
}

// ---------------------------------------------------------------------------
// 8. One failing pair does not stop the others
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failing_pair_is_isolated() {
    let registry = TechnologyRegistry::builder()
        .watcher("iam", FakeWatcher::failing("AccessDenied"))
        .watcher("s3", FakeWatcher::returning(vec![bucket("a", "private")]))
        .build()
        .unwrap();
    let harness = Harness::new(registry, EngineConfig::default(), &["prod"]).await;

    let summary = harness
        .coordinator()
        .run_cycle(CycleRequest::forced(NameFilter::named(["prod"]), NameFilter::All))
        .await
        .unwrap();
    assert_eq!(summary.attempted, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failures[0].pair, Pair::new("prod", "iam"));
    assert_eq!(summary.failures[0].kind, "collector_failed");

    let failed = harness.store.last_run(&Pair::new("prod", "iam")).await.unwrap().unwrap();
    assert_eq!(failed.outcome, RunOutcome::Failure);
    assert!(failed.last_error.unwrap().contains("AccessDenied"));
    let ok = harness.store.last_run(&Pair::new("prod", "s3")).await.unwrap().unwrap();
    assert_eq!(ok.outcome, RunOutcome::Success);

    let logged = harness.store.list_exceptions(10).await.unwrap();
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0].source, ExceptionSource::Watcher);
    assert_eq!(logged[0].technology.as_deref(), Some("iam"));
}

// ---------------------------------------------------------------------------
// 9. Repeated failures flag a pair for attention
// ---------------------------------------------------------------------------

#[tokio::test]
async fn repeated_failures_flag_then_clear() {
    let watcher = FakeWatcher::failing("throttled");
    let config = EngineConfig {
        attention_threshold: 2,
        ..EngineConfig::default()
    };
    let harness = single_pair(watcher.clone(), FakeAuditor::new("acl"), config).await;
    let coordinator = harness.coordinator();

    let first = coordinator.run_cycle(forced("prod", "s3")).await.unwrap();
    assert!(first.needs_attention.is_empty());
    let second = coordinator.run_cycle(forced("prod", "s3")).await.unwrap();
    assert_eq!(second.needs_attention, vec![Pair::new("prod", "s3")]);

    watcher.set(Vec::new());
    let third = coordinator.run_cycle(forced("prod", "s3")).await.unwrap();
    assert!(third.needs_attention.is_empty());
    let run = harness.store.last_run(&Pair::new("prod", "s3")).await.unwrap().unwrap();
    assert_eq!(run.consecutive_failures, 0);
}

// ---------------------------------------------------------------------------
// 10. Report delivery failures are logged, not fatal
// ---------------------------------------------------------------------------

struct RejectingSink;

#[async_trait]
impl ReportSink for RejectingSink {
    async fn deliver(&self, _summary: &CycleSummary) -> Result<(), ReportError> {
        Err(ReportError::Delivery("mail relay refused".into()))
    }
}

#[tokio::test]
async fn report_failure_is_recorded() {
    let watcher = FakeWatcher::returning(vec![bucket("a", "private")]);
    let harness = single_pair(watcher, FakeAuditor::new("acl"), EngineConfig::default()).await;
    let coordinator = harness.coordinator().with_report_sink(Arc::new(RejectingSink));

    let summary = coordinator
        .run_cycle(forced("prod", "s3").with_report(true))
        .await
        .unwrap();
    assert_eq!(summary.succeeded, 1);

    let logged = harness.store.list_exceptions(10).await.unwrap();
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0].source, ExceptionSource::Report);
}

// ---------------------------------------------------------------------------
// 11. The scheduler drains and stops on shutdown
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scheduler_runs_until_shutdown() {
    let watcher = FakeWatcher::returning(vec![bucket("a", "private")]);
    let harness = single_pair(watcher.clone(), FakeAuditor::new("acl"), EngineConfig::default()).await;
    let coordinator = harness.coordinator();
    let scheduler = Scheduler::new(coordinator.clone(), CycleRequest::scheduled().with_report(false))
        .with_tick(Duration::from_millis(10));

    let completed = scheduler
        .run(tokio::time::sleep(Duration::from_millis(100)))
        .await;
    assert!(completed >= 1);
    assert!(coordinator.is_shutdown());
    // Daily default: only the first tick found the pair due.
    assert_eq!(watcher.calls(), 1);

    let after = coordinator
        .run_cycle(forced("prod", "s3"))
        .await
        .unwrap();
    assert_eq!(after.attempted, 0);
}

// ---------------------------------------------------------------------------
// 12. Operator edits made during a reconciliation are kept
// ---------------------------------------------------------------------------

#[tokio::test]
async fn justification_saved_mid_reconcile_is_kept() {
    let watcher = FakeWatcher::returning(vec![bucket("a", "public-read")]);
    let auditor = FakeAuditor::new("acl");
    auditor.report(vec![public_bucket("a")]);
    let harness = single_pair(watcher, auditor, EngineConfig::default()).await;
    let coordinator = harness.coordinator();
    let request = forced("prod", "s3").with_audit(true);
    let pair = Pair::new("prod", "s3");

    coordinator.run_cycle(request.clone()).await.unwrap();
    harness
        .store
        .interfere_after_open_read(Interference::Justify("public by intent".into()));
    let summary = coordinator.run_cycle(request).await.unwrap();
    assert_eq!(summary.issues_refreshed, 1);

    let issues = harness.store.issues(&pair, None).await.unwrap();
    assert_eq!(issues.len(), 1);
    assert!(issues[0].is_open());
    assert!(issues[0].justified);
    assert_eq!(issues[0].justification.as_deref(), Some("public by intent"));
    assert_eq!(issues[0].justified_by.as_deref(), Some("ops"));
}

#[tokio::test]
async fn issue_deleted_mid_reconcile_is_not_recreated() {
    let watcher = FakeWatcher::returning(vec![bucket("a", "public-read"), bucket("b", "public-read")]);
    let auditor = FakeAuditor::new("acl");
    auditor.report(vec![public_bucket("a"), public_bucket("b")]);
    let harness = single_pair(watcher, auditor.clone(), EngineConfig::default()).await;
    let coordinator = harness.coordinator();
    let request = forced("prod", "s3").with_audit(true);
    let pair = Pair::new("prod", "s3");

    coordinator.run_cycle(request.clone()).await.unwrap();
    // "b" is no longer reported, so its issue would be closed.
    auditor.report(vec![public_bucket("a")]);
    harness
        .store
        .interfere_after_open_read(Interference::DeleteUnjustified);
    let summary = coordinator.run_cycle(request.clone()).await.unwrap();
    assert_eq!(summary.issues_refreshed, 0);
    assert_eq!(summary.issues_closed, 0);
    assert!(harness.store.issues(&pair, None).await.unwrap().is_empty());

    // The next pass opens a fresh issue for the finding still reported.
    let next = coordinator.run_cycle(request).await.unwrap();
    assert_eq!(next.issues_opened, 1);
}

// ---------------------------------------------------------------------------
// 13. Watcher and auditor timeouts are contained
// ---------------------------------------------------------------------------

fn short_timeouts() -> EngineConfig {
    EngineConfig {
        watcher_timeout_secs: 1,
        auditor_timeout_secs: 1,
        ..EngineConfig::default()
    }
}

#[tokio::test(start_paused = true)]
async fn watcher_timeout_fails_only_that_pair() {
    let stuck = FakeWatcher::parking(vec![bucket("a", "private")]);
    let registry = TechnologyRegistry::builder()
        .watcher("s3", stuck)
        .watcher("iam", FakeWatcher::returning(vec![bucket("role", "admin")]))
        .build()
        .unwrap();
    let harness = Harness::new(registry, short_timeouts(), &["prod"]).await;

    let summary = harness
        .coordinator()
        .run_cycle(CycleRequest::forced(NameFilter::All, NameFilter::All))
        .await
        .unwrap();
    assert_eq!(summary.attempted, 2);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.failures[0].pair, Pair::new("prod", "s3"));
    assert_eq!(summary.failures[0].kind, "collector_timeout");

    let run = harness.store.last_run(&Pair::new("prod", "s3")).await.unwrap().unwrap();
    assert_eq!(run.outcome, RunOutcome::Failure);
    assert_eq!(run.consecutive_failures, 1);
    let logged = harness.store.list_exceptions(10).await.unwrap();
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0].source, ExceptionSource::Watcher);
    assert_eq!(logged[0].kind, "collector_timeout");
}

#[tokio::test(start_paused = true)]
async fn auditor_timeout_leaves_other_auditors_applied() {
    let acl = FakeAuditor::new("acl");
    acl.report(vec![public_bucket("a")]);
    let registry = TechnologyRegistry::builder()
        .watcher("s3", FakeWatcher::returning(vec![bucket("a", "public-read")]))
        .auditor("s3", FakeAuditor::hanging("encryption"))
        .auditor("s3", acl)
        .build()
        .unwrap();
    let harness = Harness::new(registry, short_timeouts(), &["prod"]).await;

    let summary = harness
        .coordinator()
        .run_cycle(forced("prod", "s3").with_audit(true))
        .await
        .unwrap();
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.evaluator_failures, 1);
    assert_eq!(summary.issues_opened, 1);

    let logged = harness.store.list_exceptions(10).await.unwrap();
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0].source, ExceptionSource::Auditor);
    assert_eq!(logged[0].kind, "evaluator_timeout");
}

// ---------------------------------------------------------------------------
// 14. Store failures fail the pair and are logged
// ---------------------------------------------------------------------------

#[tokio::test]
async fn store_failure_fails_the_pair_and_still_records_last_run() {
    let watcher = FakeWatcher::returning(vec![bucket("a", "private")]);
    let harness = single_pair(watcher, FakeAuditor::new("acl"), EngineConfig::default()).await;
    harness.store.fail_appends();

    let summary = harness.coordinator().run_cycle(forced("prod", "s3")).await.unwrap();
    assert_eq!(summary.attempted, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.failures[0].kind, "store_failed");

    let logged = harness.store.list_exceptions(10).await.unwrap();
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0].source, ExceptionSource::Store);
    let run = harness.store.last_run(&Pair::new("prod", "s3")).await.unwrap().unwrap();
    assert_eq!(run.outcome, RunOutcome::Failure);
    assert!(run.last_error.as_deref().unwrap_or("").contains("disk full"));
}

// ---------------------------------------------------------------------------
// 15. Shutdown lets in-flight pairs finish
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_lets_the_running_pair_finish() {
    let watcher = FakeWatcher::parking(vec![bucket("a", "private")]);
    let config = EngineConfig {
        pool_size: 1,
        ..EngineConfig::default()
    };
    let registry = TechnologyRegistry::builder()
        .watcher("s3", watcher.clone())
        .build()
        .unwrap();
    let harness = Harness::new(registry, config, &["dev", "prod"]).await;
    let coordinator = harness.coordinator();

    let cycle = tokio::spawn({
        let coordinator = coordinator.clone();
        async move {
            coordinator
                .run_cycle(CycleRequest::forced(NameFilter::All, NameFilter::All))
                .await
        }
    });
    // One pair holds the only permit; the other is queued behind it.
    watcher.entered.notified().await;
    coordinator.shutdown();
    watcher.release.notify_one();

    let summary = cycle.await.unwrap().unwrap();
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.skipped_shutdown, 1);
    assert_eq!(watcher.calls(), 1);

    let runs = harness.store.list_last_runs().await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].outcome, RunOutcome::Success);
}
