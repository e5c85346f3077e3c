//! # Administration Subcommands
//!
//! Thin wrappers over [`secmon_engine::Admin`]. Every failure is also
//! written to the exception log by the engine.

use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;
use clap::Args;
use secmon_engine::{Admin, EngineContext, JsonDirectorySink};
use uuid::Uuid;

use crate::SelectionArgs;

/// Arguments for `add-watcher-config`.
#[derive(Args, Debug, Clone)]
pub struct WatcherConfigArgs {
    /// Registered technology name.
    pub name: String,

    /// Polling interval in minutes: 15, 60, 720, 1440 or 10080.
    #[arg(long, default_value_t = 1440)]
    pub interval: u32,

    /// Store the technology as disabled.
    #[arg(long)]
    pub disabled: bool,
}

/// Arguments for `backup-config-to-json`.
#[derive(Args, Debug, Clone)]
pub struct BackupArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Directory receiving `<account>/<technology>.json`.
    #[arg(short, long)]
    pub output: PathBuf,
}

/// Arguments for `justify-issue`.
#[derive(Args, Debug, Clone)]
pub struct JustifyArgs {
    /// Issue id.
    pub id: Uuid,

    /// Why the issue is accepted.
    pub justification: String,

    /// Who accepted it.
    #[arg(long)]
    pub by: Option<String>,
}

/// Arguments for `unjustify-issue`.
#[derive(Args, Debug, Clone)]
pub struct UnjustifyArgs {
    /// Issue id.
    pub id: Uuid,
}

/// Execute `add-watcher-config`.
pub async fn run_add_watcher_config(args: &WatcherConfigArgs, ctx: &EngineContext) -> Result<u8> {
    let config = Admin::new(ctx.clone())
        .set_technology_config(&args.name, args.interval, !args.disabled)
        .await?;
    println!(
        "{}: every {}{}",
        config.name,
        config.interval,
        if config.active { "" } else { " (disabled)" }
    );
    Ok(0)
}

/// Execute `delete-unjustified-issues`.
pub async fn run_delete_unjustified(args: &SelectionArgs, ctx: &EngineContext) -> Result<u8> {
    let report = Admin::new(ctx.clone())
        .delete_unjustified_issues(&args.accounts, &args.technologies)
        .await?;
    for (pair, removed) in report.per_pair.iter().filter(|(_, n)| *n > 0) {
        println!("{pair}: {removed}");
    }
    println!("Deleted {} unjustified issues", report.total);
    Ok(0)
}

/// Execute `backup-config-to-json`.
pub async fn run_backup(args: &BackupArgs, ctx: &EngineContext) -> Result<u8> {
    let sink = JsonDirectorySink::new(&args.output);
    let report = Admin::new(ctx.clone())
        .export_latest(&args.selection.accounts, &args.selection.technologies, &sink)
        .await?;
    println!(
        "Exported {} items from {} pairs to {}",
        report.items,
        report.pairs,
        args.output.display()
    );
    Ok(0)
}

/// Execute `justify-issue`.
pub async fn run_justify(args: &JustifyArgs, ctx: &EngineContext) -> Result<u8> {
    let issue = Admin::new(ctx.clone())
        .justify_issue(args.id, &args.justification, args.by.clone(), Utc::now())
        .await?;
    println!("Justified {} ({})", issue.id, issue.key());
    Ok(0)
}

/// Execute `unjustify-issue`.
pub async fn run_unjustify(args: &UnjustifyArgs, ctx: &EngineContext) -> Result<u8> {
    let issue = Admin::new(ctx.clone()).unjustify_issue(args.id).await?;
    println!("Withdrew justification of {}", issue.id);
    Ok(0)
}

/// Execute `clear-expired-exceptions`.
pub async fn run_clear_expired(ctx: &EngineContext) -> Result<u8> {
    let removed = Admin::new(ctx.clone())
        .purge_expired_exceptions(Utc::now())
        .await?;
    println!("Removed {removed} expired exception log entries");
    Ok(0)
}
