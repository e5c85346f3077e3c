//! # Run Subcommands
//!
//! - `find-changes`: forced watch of the selection.
//! - `audit-changes`: forced watch and audit, optionally reported.
//! - `run-change-reporter`: forced watch, audit and report.
//! - `start-scheduler`: scheduled cycles over everything until Ctrl-C.
//!
//! Cycle summaries are printed to stdout as JSON. The exit code is 1 when
//! any pair failed.

use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use secmon_engine::{
    CycleRequest, CycleSummary, EngineContext, LogReportSink, RunCoordinator, Scheduler,
};
use tracing::{error, info};

use crate::SelectionArgs;

/// Arguments for `audit-changes`.
#[derive(Args, Debug, Clone)]
pub struct AuditArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Hand the cycle summary to the report sink.
    #[arg(long)]
    pub send_report: bool,
}

fn coordinator(ctx: &EngineContext) -> RunCoordinator {
    RunCoordinator::new(ctx.clone()).with_report_sink(Arc::new(LogReportSink))
}

fn forced(selection: &SelectionArgs) -> CycleRequest {
    CycleRequest::forced(selection.accounts.clone(), selection.technologies.clone())
}

async fn run_and_print(ctx: &EngineContext, request: CycleRequest) -> Result<u8> {
    let summary = coordinator(ctx).run_cycle(request).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(exit_code(&summary))
}

fn exit_code(summary: &CycleSummary) -> u8 {
    if summary.failed > 0 {
        1
    } else {
        0
    }
}

/// Execute `find-changes`.
pub async fn run_find_changes(args: &SelectionArgs, ctx: &EngineContext) -> Result<u8> {
    run_and_print(ctx, forced(args)).await
}

/// Execute `audit-changes`.
pub async fn run_audit_changes(args: &AuditArgs, ctx: &EngineContext) -> Result<u8> {
    let request = forced(&args.selection)
        .with_audit(true)
        .with_report(args.send_report);
    run_and_print(ctx, request).await
}

/// Execute `run-change-reporter`.
pub async fn run_change_reporter(args: &SelectionArgs, ctx: &EngineContext) -> Result<u8> {
    let request = forced(args).with_audit(true).with_report(true);
    run_and_print(ctx, request).await
}

/// Execute `start-scheduler`. Returns once Ctrl-C is received and every
/// in-flight cycle has finished.
pub async fn run_scheduler(ctx: &EngineContext) -> Result<u8> {
    let scheduler = Scheduler::new(coordinator(ctx), CycleRequest::scheduled());
    let completed = scheduler
        .run(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Ctrl-C received; shutting down"),
                Err(e) => error!(error = %e, "Cannot listen for Ctrl-C; shutting down"),
            }
        })
        .await;
    info!(completed, "Scheduler exited");
    Ok(0)
}
