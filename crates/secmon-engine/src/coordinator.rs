//! # Run Coordinator
//!
//! Runs one cycle over a selection of (account, technology) pairs.
//!
//! ## Dispatch
//!
//! For every selected pair, in account order then technology order:
//!
//! 1. `Scheduled` mode asks the [`IntervalGate`]; pairs that are not due are
//!    skipped. `Forced` mode skips the gate.
//! 2. The pair lock is taken without waiting. A pair already running in
//!    another cycle is skipped as in flight.
//! 3. The pair is spawned; it waits for a permit from the semaphore shared by
//!    every cycle of this coordinator, so total concurrency never exceeds
//!    `pool_size`. A scheduled pair re-checks the gate once it holds its
//!    permit, since another cycle may have just run it.
//!
//! ## Failure isolation
//!
//! A pair's run is change detection, then reconciliation when auditing is
//! requested. Any failure is logged, written to the exception log and
//! counted; it never stops other pairs. The pair's `LastRun` is written
//! whatever the outcome, while the pair lock is still held.
//!
//! ## Shutdown
//!
//! After [`RunCoordinator::shutdown`] no further pair is dispatched and
//! pairs still waiting for a permit are dropped. Pairs already running
//! finish normally.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use secmon_core::{Account, ExceptionEntry, ExceptionSource, LastRun, Pair, RunOutcome};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::context::EngineContext;
use crate::detector::ChangeDetector;
use crate::error::EngineError;
use crate::gate::IntervalGate;
use crate::locks::PairGuard;
use crate::reconciler::IssueReconciler;
use crate::report::ReportSink;
use crate::selector::{resolve_technologies, AccountSelector, NameFilter};

/// Whether the interval gate applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Only pairs that are due run.
    Scheduled,
    /// Every selected pair runs now.
    Forced,
}

/// What one cycle should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleRequest {
    /// Accounts to run. `All` means active first-party accounts.
    pub accounts: NameFilter,
    /// Technologies to run. `All` means every registered technology.
    pub technologies: NameFilter,
    /// Gate or force.
    pub mode: RunMode,
    /// Run auditors and reconcile issues after change detection.
    pub audit: bool,
    /// Hand the summary to the report sink.
    pub report: bool,
}

impl CycleRequest {
    /// Every due pair, audited and reported.
    pub fn scheduled() -> Self {
        Self {
            accounts: NameFilter::All,
            technologies: NameFilter::All,
            mode: RunMode::Scheduled,
            audit: true,
            report: true,
        }
    }

    /// Watch the selected pairs now, without auditing or reporting.
    pub fn forced(accounts: NameFilter, technologies: NameFilter) -> Self {
        Self {
            accounts,
            technologies,
            mode: RunMode::Forced,
            audit: false,
            report: false,
        }
    }

    /// Builder: enable or disable auditing.
    pub fn with_audit(mut self, audit: bool) -> Self {
        self.audit = audit;
        self
    }

    /// Builder: enable or disable reporting.
    pub fn with_report(mut self, report: bool) -> Self {
        self.report = report;
        self
    }
}

/// A pair whose run failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairFailure {
    /// The pair.
    pub pair: Pair,
    /// Short failure kind, as written to the exception log.
    pub kind: String,
    /// Failure message.
    pub message: String,
}

/// Counts and failures of one cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleSummary {
    /// When the cycle started.
    pub started_at: DateTime<Utc>,
    /// When the cycle finished.
    pub finished_at: DateTime<Utc>,
    /// Pairs that ran.
    pub attempted: usize,
    /// Pairs that ran successfully.
    pub succeeded: usize,
    /// Pairs that ran and failed.
    pub failed: usize,
    /// Pairs skipped by the interval gate.
    pub skipped_not_due: usize,
    /// Pairs skipped because another cycle was running them.
    pub skipped_in_flight: usize,
    /// Pairs skipped because the named account does not exist.
    pub skipped_missing_account: usize,
    /// Pairs dropped because shutdown was requested before they started.
    pub skipped_shutdown: usize,
    /// Item revisions written.
    pub revisions_written: usize,
    /// Issues opened.
    pub issues_opened: usize,
    /// Open issues refreshed.
    pub issues_refreshed: usize,
    /// Issues closed.
    pub issues_closed: usize,
    /// Auditor runs that failed or timed out.
    pub evaluator_failures: usize,
    /// Details of failed pairs.
    pub failures: Vec<PairFailure>,
    /// Pairs flagged after repeated failures, across the whole store.
    pub needs_attention: Vec<Pair>,
}

impl CycleSummary {
    fn absorb(&mut self, report: PairReport) {
        self.attempted += 1;
        match report.outcome {
            RunOutcome::Success => self.succeeded += 1,
            RunOutcome::Failure => self.failed += 1,
        }
        self.revisions_written += report.revisions_written;
        self.issues_opened += report.issues_opened;
        self.issues_refreshed += report.issues_refreshed;
        self.issues_closed += report.issues_closed;
        self.evaluator_failures += report.evaluator_failures;
        self.failures.extend(report.failure);
    }
}

/// Outcome of one spawned pair task.
enum PairResult {
    NotDue,
    Shutdown,
    Ran(PairReport),
}

struct PairReport {
    outcome: RunOutcome,
    revisions_written: usize,
    issues_opened: usize,
    issues_refreshed: usize,
    issues_closed: usize,
    evaluator_failures: usize,
    failure: Option<PairFailure>,
}

impl PairReport {
    fn new() -> Self {
        Self {
            outcome: RunOutcome::Success,
            revisions_written: 0,
            issues_opened: 0,
            issues_refreshed: 0,
            issues_closed: 0,
            evaluator_failures: 0,
            failure: None,
        }
    }
}

/// Dispatches pair runs with bounded concurrency.
#[derive(Clone)]
pub struct RunCoordinator {
    ctx: EngineContext,
    permits: Arc<Semaphore>,
    shutdown: Arc<AtomicBool>,
    reporter: Option<Arc<dyn ReportSink>>,
}

impl RunCoordinator {
    /// Create a coordinator whose pool size comes from the context config.
    pub fn new(ctx: EngineContext) -> Self {
        let permits = Arc::new(Semaphore::new(ctx.config.pool_size));
        Self {
            ctx,
            permits,
            shutdown: Arc::new(AtomicBool::new(false)),
            reporter: None,
        }
    }

    /// Builder: deliver summaries of reporting cycles to `sink`.
    pub fn with_report_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.reporter = Some(sink);
        self
    }

    /// The shared context.
    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    /// Stop dispatching new pairs. Running pairs finish.
    pub fn shutdown(&self) {
        info!("Shutdown requested");
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Whether shutdown was requested.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    fn gate(&self) -> IntervalGate {
        IntervalGate::new(
            Arc::clone(&self.ctx.store),
            self.ctx.config.default_interval_minutes,
        )
    }

    /// Run one cycle and wait for every dispatched pair.
    ///
    /// Fails only when the account selection itself cannot be read; every
    /// later failure is confined to its pair and reported in the summary.
    #[instrument(skip(self, request), fields(mode = ?request.mode, audit = request.audit))]
    pub async fn run_cycle(&self, request: CycleRequest) -> Result<CycleSummary, EngineError> {
        let started_at = Utc::now();
        let mut summary = CycleSummary {
            started_at,
            ..CycleSummary::default()
        };

        let selector = AccountSelector::new(Arc::clone(&self.ctx.store));
        let account_names = self
            .ctx
            .bounded(selector.resolve(&request.accounts, true))
            .await?;
        let technologies = resolve_technologies(&request.technologies, &self.ctx.registry);
        debug!(
            accounts = account_names.len(),
            technologies = technologies.len(),
            "Cycle selection resolved"
        );

        let gate = self.gate();
        let mut tasks: JoinSet<PairResult> = JoinSet::new();

        'accounts: for name in &account_names {
            let account = match self.ctx.bounded(self.ctx.store.account_by_name(name)).await {
                Ok(Some(account)) => account,
                Ok(None) => {
                    warn!(account = %name, "Selected account does not exist; skipping");
                    summary.skipped_missing_account += technologies.len();
                    continue;
                }
                Err(e) => {
                    for technology in &technologies {
                        let pair = Pair::new(name.clone(), technology.clone());
                        summary.absorb(self.fail_before_dispatch(&pair, &e).await);
                    }
                    continue;
                }
            };

            for technology in &technologies {
                if self.is_shutdown() {
                    info!("Shutdown requested; no further pairs will be dispatched");
                    break 'accounts;
                }
                let pair = Pair::new(account.name.clone(), technology.clone());

                if request.mode == RunMode::Scheduled {
                    match self.ctx.bounded(gate.is_due(&pair, started_at)).await {
                        Ok(true) => {}
                        Ok(false) => {
                            summary.skipped_not_due += 1;
                            continue;
                        }
                        Err(e) => {
                            summary.absorb(self.fail_before_dispatch(&pair, &e).await);
                            continue;
                        }
                    }
                }

                let Some(guard) = self.ctx.locks.try_acquire(&pair) else {
                    debug!(account = %pair.account, technology = %pair.technology, "Pair already running; skipping");
                    summary.skipped_in_flight += 1;
                    continue;
                };

                let worker = self.clone();
                let account = account.clone();
                let mode = request.mode;
                let audit = request.audit;
                tasks.spawn(async move { worker.run_locked(guard, account, mode, audit).await });
            }
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(PairResult::NotDue) => summary.skipped_not_due += 1,
                Ok(PairResult::Shutdown) => summary.skipped_shutdown += 1,
                Ok(PairResult::Ran(report)) => summary.absorb(report),
                Err(e) => {
                    error!(error = %e, "Pair task aborted");
                    summary.attempted += 1;
                    summary.failed += 1;
                }
            }
        }

        match self.ctx.bounded(self.ctx.store.list_last_runs()).await {
            Ok(runs) => {
                summary.needs_attention = runs
                    .into_iter()
                    .filter(|r| r.needs_attention)
                    .map(|r| r.pair)
                    .collect();
            }
            Err(e) => warn!(error = %e, "Could not list pairs needing attention"),
        }
        summary.finished_at = Utc::now();

        info!(
            attempted = summary.attempted,
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped_not_due = summary.skipped_not_due,
            skipped_in_flight = summary.skipped_in_flight,
            revisions_written = summary.revisions_written,
            issues_opened = summary.issues_opened,
            issues_closed = summary.issues_closed,
            "Cycle complete"
        );

        if request.report {
            self.deliver_report(&summary).await;
        }
        Ok(summary)
    }

    async fn run_locked(
        self,
        guard: PairGuard,
        account: Account,
        mode: RunMode,
        audit: bool,
    ) -> PairResult {
        let _permit = match Arc::clone(&self.permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return PairResult::Shutdown,
        };
        if self.is_shutdown() {
            return PairResult::Shutdown;
        }
        let pair = guard.pair().clone();

        if mode == RunMode::Scheduled {
            match self.ctx.bounded(self.gate().is_due(&pair, Utc::now())).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(account = %pair.account, technology = %pair.technology, "Ran concurrently; no longer due");
                    return PairResult::NotDue;
                }
                Err(e) => {
                    warn!(account = %pair.account, technology = %pair.technology, error = %e, "Gate re-check failed; running anyway");
                }
            }
        }

        let report = run_pair(&self.ctx, &account, &pair, audit).await;
        drop(guard);
        PairResult::Ran(report)
    }

    /// Account lookup or gate failed for a pair: count it as a failed run
    /// without touching its `LastRun`.
    async fn fail_before_dispatch(&self, pair: &Pair, err: &EngineError) -> PairReport {
        error!(account = %pair.account, technology = %pair.technology, error = %err, "Pair could not be dispatched");
        record_exception(&self.ctx, pair, err.source_component(), err.kind(), err.to_string()).await;
        let mut report = PairReport::new();
        report.outcome = RunOutcome::Failure;
        report.failure = Some(PairFailure {
            pair: pair.clone(),
            kind: err.kind().to_string(),
            message: err.to_string(),
        });
        report
    }

    async fn deliver_report(&self, summary: &CycleSummary) {
        let Some(sink) = &self.reporter else {
            return;
        };
        if let Err(e) = sink.deliver(summary).await {
            error!(error = %e, "Report delivery failed");
            let entry = ExceptionEntry::new(
                ExceptionSource::Report,
                "delivery_failed",
                e.to_string(),
                Utc::now(),
                self.ctx.config.exception_ttl(),
            );
            if let Err(e) = self.ctx.bounded(self.ctx.store.append_exception(&entry)).await {
                error!(error = %e, "Could not record report failure");
            }
        }
    }
}

/// Watch, optionally audit, and record the `LastRun` of one pair. Never
/// fails: errors become part of the report.
#[instrument(skip_all, fields(account = %pair.account, technology = %pair.technology))]
async fn run_pair(ctx: &EngineContext, account: &Account, pair: &Pair, audit: bool) -> PairReport {
    let now = Utc::now();
    let mut report = PairReport::new();

    if let Err(e) = execute(ctx, account, pair, audit, now, &mut report).await {
        error!(error = %e, kind = e.kind(), "Pair run failed");
        record_exception(ctx, pair, e.source_component(), e.kind(), e.to_string()).await;
        report.outcome = RunOutcome::Failure;
        report.failure = Some(PairFailure {
            pair: pair.clone(),
            kind: e.kind().to_string(),
            message: e.to_string(),
        });
    }

    let previous = match ctx.bounded(ctx.store.last_run(pair)).await {
        Ok(previous) => previous,
        Err(e) => {
            warn!(error = %e, "Could not read previous run; failure count restarts");
            None
        }
    };
    let next = LastRun::next(
        previous.as_ref(),
        pair.clone(),
        report.outcome,
        report.failure.as_ref().map(|f| f.message.clone()),
        Utc::now(),
        ctx.config.attention_threshold,
    );
    if next.newly_flagged(previous.as_ref()) {
        error!(
            consecutive_failures = next.consecutive_failures,
            last_error = next.last_error.as_deref().unwrap_or(""),
            "Pair keeps failing and needs operator attention"
        );
    }
    if let Err(e) = ctx.bounded(ctx.store.record_last_run(&next)).await {
        error!(error = %e, "Could not record last run");
        record_exception(ctx, pair, ExceptionSource::Store, e.kind(), e.to_string()).await;
    }

    metrics::counter!("secmon_pair_runs_total", "outcome" => report.outcome.as_str()).increment(1);
    metrics::counter!("secmon_issues_opened_total").increment(report.issues_opened as u64);
    metrics::counter!("secmon_issues_closed_total").increment(report.issues_closed as u64);
    report
}

async fn execute(
    ctx: &EngineContext,
    account: &Account,
    pair: &Pair,
    audit: bool,
    now: DateTime<Utc>,
    report: &mut PairReport,
) -> Result<(), EngineError> {
    let changes = ChangeDetector::new(ctx)
        .detect(account, &pair.technology, now)
        .await?;
    report.revisions_written = changes.changed.len();
    if !audit {
        return Ok(());
    }

    let outcome = IssueReconciler::new(ctx)
        .reconcile(pair, &changes.current, now)
        .await?;
    report.issues_opened = outcome.opened.len();
    report.issues_refreshed = outcome.refreshed.len();
    report.issues_closed = outcome.closed.len();
    report.evaluator_failures = outcome.auditor_failures.len();
    for failure in &outcome.auditor_failures {
        record_exception(
            ctx,
            pair,
            ExceptionSource::Auditor,
            failure.error.kind(),
            format!("{}: {}", failure.auditor, failure.error),
        )
        .await;
    }
    Ok(())
}

async fn record_exception(
    ctx: &EngineContext,
    pair: &Pair,
    source: ExceptionSource,
    kind: &str,
    message: String,
) {
    let entry = ExceptionEntry::new(source, kind, message, Utc::now(), ctx.config.exception_ttl())
        .for_pair(pair.account.clone(), pair.technology.clone());
    if let Err(e) = ctx.bounded(ctx.store.append_exception(&entry)).await {
        error!(
            account = %pair.account,
            technology = %pair.technology,
            error = %e,
            "Could not write exception log entry"
        );
    }
}
