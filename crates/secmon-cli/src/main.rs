//! # secmon CLI entry point
//!
//! Parses command-line arguments, loads configuration, opens the datastore
//! and dispatches to subcommand handlers.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use secmon_cli::accounts::{run_add_account, run_set_active, ActivationArgs, AddAccountArgs};
use secmon_cli::config::FileConfig;
use secmon_cli::maintenance::{
    run_add_watcher_config, run_backup, run_clear_expired, run_delete_unjustified, run_justify,
    run_unjustify, BackupArgs, JustifyArgs, UnjustifyArgs, WatcherConfigArgs,
};
use secmon_cli::runs::{
    run_audit_changes, run_change_reporter, run_find_changes, run_scheduler, AuditArgs,
};
use secmon_cli::{open_context, SelectionArgs};

/// secmon: configuration-drift and security audit engine for cloud
/// account fleets.
#[derive(Parser, Debug)]
#[command(name = "secmon", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    /// Ignored when RUST_LOG is set.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    /// Path to the YAML configuration file.
    #[arg(long, global = true, env = "SECMON_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Watch the selected pairs now and record changes.
    FindChanges(SelectionArgs),

    /// Watch and audit the selected pairs now.
    AuditChanges(AuditArgs),

    /// Watch, audit and report on the selected pairs now.
    RunChangeReporter(SelectionArgs),

    /// Run scheduled cycles until Ctrl-C.
    StartScheduler,

    /// Delete unjustified issues of the selected pairs.
    DeleteUnjustifiedIssues(SelectionArgs),

    /// Export the latest live configuration of the selected pairs.
    #[command(name = "backup-config-to-json")]
    BackupConfigToJson(BackupArgs),

    /// Register an account.
    AddAccount(AddAccountArgs),

    /// Enable accounts.
    EnableAccounts(ActivationArgs),

    /// Disable accounts.
    DisableAccounts(ActivationArgs),

    /// Set a technology's polling interval and active flag.
    AddWatcherConfig(WatcherConfigArgs),

    /// Remove expired exception log entries.
    ClearExpiredExceptions,

    /// Accept an issue with a justification.
    JustifyIssue(JustifyArgs),

    /// Withdraw an issue's justification.
    UnjustifyIssue(UnjustifyArgs),
}

fn init_tracing(verbose: u8, json: bool) {
    let filter = match std::env::var("RUST_LOG") {
        Ok(_) => EnvFilter::from_default_env(),
        Err(_) => match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        },
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<u8> {
    let config = FileConfig::load(cli.config.as_deref())?;
    let ctx = open_context(config).await?;
    tracing::debug!(command = ?cli.command, "secmon starting");

    match &cli.command {
        Commands::FindChanges(args) => run_find_changes(args, &ctx).await,
        Commands::AuditChanges(args) => run_audit_changes(args, &ctx).await,
        Commands::RunChangeReporter(args) => run_change_reporter(args, &ctx).await,
        Commands::StartScheduler => run_scheduler(&ctx).await,
        Commands::DeleteUnjustifiedIssues(args) => run_delete_unjustified(args, &ctx).await,
        Commands::BackupConfigToJson(args) => run_backup(args, &ctx).await,
        Commands::AddAccount(args) => run_add_account(args, &ctx).await,
        Commands::EnableAccounts(args) => run_set_active(args, true, &ctx).await,
        Commands::DisableAccounts(args) => run_set_active(args, false, &ctx).await,
        Commands::AddWatcherConfig(args) => run_add_watcher_config(args, &ctx).await,
        Commands::ClearExpiredExceptions => run_clear_expired(&ctx).await,
        Commands::JustifyIssue(args) => run_justify(args, &ctx).await,
        Commands::UnjustifyIssue(args) => run_unjustify(args, &ctx).await,
    }
}
