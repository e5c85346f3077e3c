//! # Technology Registry
//!
//! Watchers and auditors are plugins registered by name. The engine never
//! knows what a technology is beyond its name: it asks the registry for the
//! watcher that collects it and the auditors that evaluate it.
//!
//! The registry is assembled once through [`RegistryBuilder`] and is
//! immutable afterwards.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use secmon_core::{Account, CollectedItem, Finding, ItemRevision};

use crate::error::{CollectorError, EvaluatorError, RegistryError};

/// Collects the current state of one technology in one account.
#[async_trait]
pub trait Watcher: Send + Sync {
    /// Fetch every resource of this technology in `account`.
    async fn fetch(&self, account: &Account) -> Result<Vec<CollectedItem>, CollectorError>;

    /// JSON pointers of fields that change without being meaningful
    /// (timestamps, counters). They are stripped before hashing.
    fn ephemeral_paths(&self) -> &[String] {
        &[]
    }
}

/// Evaluates rules over the current items of one technology.
#[async_trait]
pub trait Auditor: Send + Sync {
    /// Name, unique within a technology. Issues remember which auditor
    /// produced them.
    fn name(&self) -> &str;

    /// Evaluate all live items of a pair and return candidate findings.
    async fn evaluate(&self, items: &[ItemRevision]) -> Result<Vec<Finding>, EvaluatorError>;
}

struct TechnologyEntry {
    watcher: Arc<dyn Watcher>,
    auditors: Vec<Arc<dyn Auditor>>,
}

/// Name-keyed map of technologies to their watcher and auditors.
#[derive(Default)]
pub struct TechnologyRegistry {
    entries: BTreeMap<String, TechnologyEntry>,
}

impl std::fmt::Debug for TechnologyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (name, entry) in &self.entries {
            let auditors: Vec<&str> = entry.auditors.iter().map(|a| a.name()).collect();
            map.entry(name, &auditors);
        }
        map.finish()
    }
}

impl TechnologyRegistry {
    /// Start building a registry.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Every registered technology name, sorted.
    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Whether a technology is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// The watcher for a technology.
    pub fn watcher(&self, name: &str) -> Option<Arc<dyn Watcher>> {
        self.entries.get(name).map(|e| Arc::clone(&e.watcher))
    }

    /// The auditors for a technology, in registration order. Empty for an
    /// unknown technology.
    pub fn auditors(&self, name: &str) -> Vec<Arc<dyn Auditor>> {
        self.entries
            .get(name)
            .map(|e| e.auditors.clone())
            .unwrap_or_default()
    }
}

/// Collects registrations and validates them on [`RegistryBuilder::build`].
#[derive(Default)]
pub struct RegistryBuilder {
    watchers: Vec<(String, Arc<dyn Watcher>)>,
    auditors: Vec<(String, Arc<dyn Auditor>)>,
}

impl RegistryBuilder {
    /// Register the watcher for `technology`.
    pub fn watcher(mut self, technology: impl Into<String>, watcher: Arc<dyn Watcher>) -> Self {
        self.watchers.push((technology.into(), watcher));
        self
    }

    /// Register an auditor for `technology`.
    pub fn auditor(mut self, technology: impl Into<String>, auditor: Arc<dyn Auditor>) -> Self {
        self.auditors.push((technology.into(), auditor));
        self
    }

    /// Validate and freeze the registrations.
    pub fn build(self) -> Result<TechnologyRegistry, RegistryError> {
        let mut entries: BTreeMap<String, TechnologyEntry> = BTreeMap::new();
        for (name, watcher) in self.watchers {
            if entries.contains_key(&name) {
                return Err(RegistryError::DuplicateTechnology(name));
            }
            entries.insert(
                name,
                TechnologyEntry {
                    watcher,
                    auditors: Vec::new(),
                },
            );
        }
        for (technology, auditor) in self.auditors {
            let Some(entry) = entries.get_mut(&technology) else {
                return Err(RegistryError::UnknownTechnology {
                    technology,
                    auditor: auditor.name().to_string(),
                });
            };
            if entry.auditors.iter().any(|a| a.name() == auditor.name()) {
                return Err(RegistryError::DuplicateAuditor {
                    technology,
                    auditor: auditor.name().to_string(),
                });
            }
            entry.auditors.push(auditor);
        }
        Ok(TechnologyRegistry { entries })
    }
}
