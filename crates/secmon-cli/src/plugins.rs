//! # Reference Plugins
//!
//! Watchers and auditors wired from the configuration file.
//!
//! - [`SnapshotWatcher`] reads `<snapshot_dir>/<account>/<technology>.json`,
//!   written by whatever exports the provider's state. The file holds either
//!   an array of `{"resource_key": ..., "config": ...}` objects or an object
//!   keyed by resource key.
//! - [`PointerRuleAuditor`] evaluates JSON-pointer rules against every live
//!   item.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use secmon_core::{Account, CollectedItem, Finding, ItemRevision};
use secmon_engine::{Auditor, CollectorError, EvaluatorError, TechnologyRegistry, Watcher};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::{FileConfig, RuleSection};

// --- Snapshot watcher ---

/// Reads provider state from JSON snapshot files.
#[derive(Debug, Clone)]
pub struct SnapshotWatcher {
    root: PathBuf,
    technology: String,
    ephemeral_paths: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SnapshotFile {
    Items(Vec<SnapshotItem>),
    Keyed(BTreeMap<String, Value>),
}

#[derive(Deserialize)]
struct SnapshotItem {
    resource_key: String,
    config: Value,
}

impl SnapshotWatcher {
    /// Watch `technology` under `root`.
    pub fn new(root: impl Into<PathBuf>, technology: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            technology: technology.into(),
            ephemeral_paths: Vec::new(),
        }
    }

    /// Builder: pointers excluded from change detection.
    pub fn with_ephemeral_paths(mut self, paths: Vec<String>) -> Self {
        self.ephemeral_paths = paths;
        self
    }

    /// Snapshot file for an account.
    pub fn path_for(&self, account: &Account) -> PathBuf {
        self.root
            .join(&account.name)
            .join(format!("{}.json", self.technology))
    }
}

#[async_trait]
impl Watcher for SnapshotWatcher {
    async fn fetch(&self, account: &Account) -> Result<Vec<CollectedItem>, CollectorError> {
        let path = self.path_for(account);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| CollectorError::Failed(format!("reading {}: {e}", path.display())))?;
        let file: SnapshotFile = serde_json::from_slice(&bytes)
            .map_err(|e| CollectorError::Failed(format!("parsing {}: {e}", path.display())))?;
        let items = match file {
            SnapshotFile::Items(items) => items
                .into_iter()
                .map(|i| CollectedItem::new(i.resource_key, i.config))
                .collect(),
            SnapshotFile::Keyed(map) => map
                .into_iter()
                .map(|(key, config)| CollectedItem::new(key, config))
                .collect(),
        };
        Ok(items)
    }

    fn ephemeral_paths(&self) -> &[String] {
        &self.ephemeral_paths
    }
}

// --- Pointer rule auditor ---

#[derive(Debug, Clone, PartialEq)]
enum Condition {
    Equals(Value),
    NotEquals(Value),
    Exists(bool),
}

impl Condition {
    fn fires(&self, found: Option<&Value>) -> bool {
        match self {
            Self::Equals(expected) => found == Some(expected),
            Self::NotEquals(expected) => found != Some(expected),
            Self::Exists(present) => found.is_some() == *present,
        }
    }
}

#[derive(Debug, Clone)]
struct PointerRule {
    rule: RuleSection,
    condition: Condition,
}

impl PointerRule {
    fn from_section(rule: RuleSection) -> Option<Self> {
        let condition = match (&rule.equals, &rule.not_equals, rule.exists) {
            (Some(v), None, None) => Condition::Equals(v.clone()),
            (None, Some(v), None) => Condition::NotEquals(v.clone()),
            (None, None, Some(present)) => Condition::Exists(present),
            _ => return None,
        };
        Some(Self { rule, condition })
    }

    fn check(&self, item: &ItemRevision) -> Option<Finding> {
        let found = item.config.pointer(&self.rule.pointer);
        if !self.condition.fires(found) {
            return None;
        }
        Some(
            Finding::new(
                item.resource_key.clone(),
                self.rule.rule_id.clone(),
                self.rule.severity,
                self.rule.summary.clone(),
            )
            .with_evidence(json!({
                "pointer": self.rule.pointer,
                "value": found,
            })),
        )
    }
}

/// Evaluates a named group of JSON-pointer rules.
#[derive(Debug, Clone)]
pub struct PointerRuleAuditor {
    name: String,
    rules: Vec<PointerRule>,
}

impl PointerRuleAuditor {
    /// Build an auditor from rule sections. Sections without exactly one
    /// condition are skipped with a warning; [`FileConfig`] loading
    /// rejects them earlier.
    pub fn new(name: impl Into<String>, rules: Vec<RuleSection>) -> Self {
        let name = name.into();
        let rules = rules
            .into_iter()
            .filter_map(|section| {
                let rule_id = section.rule_id.clone();
                let rule = PointerRule::from_section(section);
                if rule.is_none() {
                    tracing::warn!(auditor = %name, rule = %rule_id, "Skipping rule without a single condition");
                }
                rule
            })
            .collect();
        Self { name, rules }
    }

    /// Number of usable rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the auditor has no usable rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[async_trait]
impl Auditor for PointerRuleAuditor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn evaluate(&self, items: &[ItemRevision]) -> Result<Vec<Finding>, EvaluatorError> {
        Ok(items
            .iter()
            .filter(|item| item.is_active())
            .flat_map(|item| self.rules.iter().filter_map(move |rule| rule.check(item)))
            .collect())
    }
}

// --- Registry wiring ---

/// Register one snapshot watcher per configured technology and one rule
/// auditor per (technology, auditor) group.
pub fn build_registry(config: &FileConfig) -> Result<TechnologyRegistry> {
    let mut builder = TechnologyRegistry::builder();
    if let Some(root) = &config.snapshot_dir {
        for tech in &config.technologies {
            let watcher = SnapshotWatcher::new(root.clone(), tech.name.clone())
                .with_ephemeral_paths(tech.ephemeral_paths.clone());
            builder = builder.watcher(tech.name.clone(), Arc::new(watcher));
        }
    }

    let mut groups: BTreeMap<(String, String), Vec<RuleSection>> = BTreeMap::new();
    for rule in &config.rules {
        groups
            .entry((rule.technology.clone(), rule.auditor.clone()))
            .or_default()
            .push(rule.clone());
    }
    for ((technology, auditor), rules) in groups {
        builder = builder.auditor(technology, Arc::new(PointerRuleAuditor::new(auditor, rules)));
    }
    Ok(builder.build()?)
}
