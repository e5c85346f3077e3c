//! # Configuration File
//!
//! One YAML document configures both the engine and the bundled plugins:
//!
//! ```yaml
//! engine:
//!   pool_size: 8
//!   tick_secs: 60
//! snapshot_dir: /var/lib/secmon/snapshots
//! technologies:
//!   - name: s3
//!     ephemeral_paths: ["/LastModified"]
//! rules:
//!   - technology: s3
//!     auditor: s3-acl
//!     rule_id: s3-public-read
//!     pointer: /Acl
//!     equals: public-read
//!     severity: high
//!     summary: Bucket grants public read
//! ```
//!
//! Every section is optional. `SECMON_*` environment variables override the
//! `engine` section after the file is read.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use secmon_core::Severity;
use secmon_engine::EngineConfig;
use serde::Deserialize;

/// Auditor name used by rules that do not name one.
pub const DEFAULT_AUDITOR: &str = "rules";

/// The whole configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Engine tunables.
    pub engine: EngineConfig,
    /// Root of the snapshot tree read by the snapshot watcher.
    pub snapshot_dir: Option<PathBuf>,
    /// Technologies to register, one snapshot watcher each.
    pub technologies: Vec<TechnologySection>,
    /// Declarative audit rules.
    pub rules: Vec<RuleSection>,
}

/// One watched technology.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TechnologySection {
    /// Technology name.
    pub name: String,
    /// JSON pointers left out of change detection.
    #[serde(default)]
    pub ephemeral_paths: Vec<String>,
}

/// One rule: a JSON pointer into each item and exactly one condition on the
/// value found there.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSection {
    /// Technology whose items are checked.
    pub technology: String,
    /// Auditor the rule belongs to.
    #[serde(default = "default_auditor")]
    pub auditor: String,
    /// Stable rule identifier; part of the issue key.
    pub rule_id: String,
    /// JSON pointer into the item configuration.
    pub pointer: String,
    /// Fires when the value equals this.
    #[serde(default)]
    pub equals: Option<serde_json::Value>,
    /// Fires when the value is absent or differs from this.
    #[serde(default)]
    pub not_equals: Option<serde_json::Value>,
    /// Fires when presence matches: `true` fires on present, `false` on absent.
    #[serde(default)]
    pub exists: Option<bool>,
    /// Severity of the resulting finding.
    pub severity: Severity,
    /// One-line finding summary.
    pub summary: String,
}

fn default_auditor() -> String {
    DEFAULT_AUDITOR.to_string()
}

impl FileConfig {
    /// Read `path`, or use defaults when no path is given, then apply
    /// environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config file {}", path.display()))?;
                Self::from_yaml(&text)
                    .with_context(|| format!("parsing config file {}", path.display()))?
            }
            None => Self::default(),
        };
        config
            .engine
            .apply_env_overrides()
            .context("applying SECMON_* overrides")?;
        Ok(config)
    }

    /// Parse and validate a YAML document. Environment overrides are not
    /// applied.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: Self = if text.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(text)?
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        self.engine.validate()?;
        if !self.technologies.is_empty() && self.snapshot_dir.is_none() {
            bail!("snapshot_dir is required when technologies are configured");
        }
        for rule in &self.rules {
            rule.validate()?;
        }
        Ok(())
    }
}

impl RuleSection {
    fn validate(&self) -> Result<()> {
        if self.rule_id.trim().is_empty() {
            bail!("rule for '{}' has an empty rule_id", self.technology);
        }
        if !self.pointer.is_empty() && !self.pointer.starts_with('/') {
            bail!(
                "rule '{}': pointer '{}' must be empty or start with '/'",
                self.rule_id,
                self.pointer
            );
        }
        let conditions = [
            self.equals.is_some(),
            self.not_equals.is_some(),
            self.exists.is_some(),
        ];
        if conditions.iter().filter(|set| **set).count() != 1 {
            bail!(
                "rule '{}' must set exactly one of equals, not_equals, exists",
                self.rule_id
            );
        }
        Ok(())
    }
}
