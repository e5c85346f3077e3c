//! # secmon-cli: Operator Command-Line Interface
//!
//! Provides the `secmon` binary. Handlers hold no business logic: they
//! take an [`EngineContext`] built from the configuration file and delegate
//! to `secmon-engine`.
//!
//! ## Subcommands
//!
//! - `find-changes`, `audit-changes`, `run-change-reporter`: forced cycles.
//! - `start-scheduler`: recurring cycles until Ctrl-C.
//! - `add-account`, `enable-accounts`, `disable-accounts`: account lifecycle.
//! - `add-watcher-config`, `delete-unjustified-issues`, `justify-issue`,
//!   `unjustify-issue`, `clear-expired-exceptions`, `backup-config-to-json`:
//!   administration.
//!
//! ## Storage
//!
//! `DATABASE_URL` selects PostgreSQL. Without it every invocation starts
//! from an empty in-memory store, which is only useful for trying out
//! plugin configuration.

pub mod accounts;
pub mod config;
pub mod maintenance;
pub mod plugins;
pub mod runs;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use secmon_engine::{EngineContext, NameFilter};

use crate::config::FileConfig;

/// Account and technology selection shared by several subcommands.
#[derive(Args, Debug, Clone)]
pub struct SelectionArgs {
    /// Comma-separated account names, or `all`.
    #[arg(short, long, default_value = "all")]
    pub accounts: NameFilter,

    /// Comma-separated technology names, or `all`.
    #[arg(short, long, default_value = "all")]
    pub technologies: NameFilter,
}

/// Wire plugins and the datastore into an engine context.
pub async fn open_context(config: FileConfig) -> Result<EngineContext> {
    let registry = plugins::build_registry(&config).context("building plugin registry")?;
    let max_connections = u32::try_from(config.engine.pool_size)
        .unwrap_or(u32::MAX)
        .saturating_add(2);
    let store = secmon_store::connect_from_env(max_connections)
        .await
        .context("opening the datastore")?;
    tracing::debug!(technologies = ?registry.names(), "Plugins registered");
    Ok(EngineContext::new(store, Arc::new(registry), config.engine))
}
