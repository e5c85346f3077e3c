//! # Account Subcommands
//!
//! - `add-account`: create an account, or overwrite it with `--force`.
//! - `enable-accounts` / `disable-accounts`: flip the active flag. `all`
//!   means every first-party account currently in the opposite state.

use anyhow::{bail, Result};
use chrono::Utc;
use clap::Args;
use secmon_core::AccountSpec;
use secmon_engine::{AccountLifecycleManager, AccountSelector, EngineContext, NameFilter, UpsertOutcome};

/// Custom field holding the account's bucket name.
pub const S3_NAME_FIELD: &str = "s3_name";

/// Custom field holding the role assumed to watch the account.
pub const ROLE_NAME_FIELD: &str = "role_name";

/// Arguments for `add-account`.
#[derive(Args, Debug, Clone)]
pub struct AddAccountArgs {
    /// Provider account identifier.
    pub identifier: String,

    /// Unique account name.
    pub name: String,

    /// Create the account disabled.
    #[arg(long)]
    pub inactive: bool,

    /// Mark the account as third-party; never selected by `all`.
    #[arg(long)]
    pub third_party: bool,

    /// Free-text notes.
    #[arg(long, default_value = "")]
    pub notes: String,

    /// Provider tag.
    #[arg(long = "type", default_value = secmon_core::DEFAULT_ACCOUNT_TYPE)]
    pub account_type: String,

    /// Bucket name custom field.
    #[arg(long)]
    pub s3_name: Option<String>,

    /// Role name custom field.
    #[arg(long)]
    pub role_name: Option<String>,

    /// Overwrite an existing account with the same identifier.
    #[arg(long)]
    pub force: bool,
}

/// Arguments for `enable-accounts` and `disable-accounts`.
#[derive(Args, Debug, Clone)]
pub struct ActivationArgs {
    /// Comma-separated account names, or `all`.
    pub accounts: NameFilter,
}

impl AddAccountArgs {
    fn to_spec(&self) -> AccountSpec {
        let mut spec = AccountSpec::new(self.identifier.clone(), self.name.clone())
            .with_active(!self.inactive)
            .with_third_party(self.third_party);
        spec.notes = self.notes.clone();
        spec.account_type = self.account_type.clone();
        if let Some(s3_name) = &self.s3_name {
            spec = spec.with_custom_field(S3_NAME_FIELD, s3_name.clone());
        }
        if let Some(role_name) = &self.role_name {
            spec = spec.with_custom_field(ROLE_NAME_FIELD, role_name.clone());
        }
        spec
    }
}

/// Execute `add-account`.
pub async fn run_add_account(args: &AddAccountArgs, ctx: &EngineContext) -> Result<u8> {
    let manager = AccountLifecycleManager::new(ctx.store.clone());
    match manager.register(args.to_spec(), args.force, Utc::now()).await? {
        UpsertOutcome::Created => println!("Created account {}", args.name),
        UpsertOutcome::Updated => println!("Updated account {}", args.name),
        UpsertOutcome::Unchanged => println!("Account {} already up to date", args.name),
        UpsertOutcome::AlreadyExists => {
            bail!(
                "account {} already exists with different settings; use --force to overwrite",
                args.identifier
            )
        }
    }
    Ok(0)
}

/// Execute `enable-accounts` (`active = true`) or `disable-accounts`.
pub async fn run_set_active(
    args: &ActivationArgs,
    active: bool,
    ctx: &EngineContext,
) -> Result<u8> {
    // `all` targets the accounts that would actually change.
    let names = AccountSelector::new(ctx.store.clone())
        .resolve(&args.accounts, !active)
        .await?;
    let report = AccountLifecycleManager::new(ctx.store.clone())
        .set_active(&names, active, Utc::now())
        .await?;
    let verb = if active { "Enabled" } else { "Disabled" };
    for name in &report.changed {
        println!("{verb} {name}");
    }
    for name in &report.unknown {
        eprintln!("No such account: {name}");
    }
    Ok(if report.unknown.is_empty() { 0 } else { 1 })
}
