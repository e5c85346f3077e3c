//! # Account and Technology Selection
//!
//! Operators select accounts and technologies either with the literal `all`
//! or with a comma-separated list of names. `all` means first-party
//! accounts in the requested active state; an explicit list is taken as
//! given and is not checked against the store.

use std::collections::HashSet;
use std::sync::Arc;

use secmon_store::{Datastore, StoreError};

use crate::registry::TechnologyRegistry;

/// `all` or an explicit list of names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameFilter {
    /// Every eligible name.
    All,
    /// Exactly these names, in this order.
    Named(Vec<String>),
}

impl NameFilter {
    /// Parse operator input. Entries are trimmed; empty entries and
    /// repeats are dropped, first occurrence wins.
    pub fn parse(input: &str) -> Self {
        if input.trim() == "all" {
            return Self::All;
        }
        Self::named(input.split(','))
    }

    /// Build an explicit list with the same clean-up as [`NameFilter::parse`].
    pub fn named<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let names = names
            .into_iter()
            .map(|n| n.as_ref().trim().to_string())
            .filter(|n| !n.is_empty())
            .filter(|n| seen.insert(n.clone()))
            .collect();
        Self::Named(names)
    }
}

impl std::str::FromStr for NameFilter {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl std::fmt::Display for NameFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Named(names) => f.write_str(&names.join(",")),
        }
    }
}

/// Resolves account filters against the store.
#[derive(Clone)]
pub struct AccountSelector {
    store: Arc<dyn Datastore>,
}

impl AccountSelector {
    /// Create a selector over `store`.
    pub fn new(store: Arc<dyn Datastore>) -> Self {
        Self { store }
    }

    /// Account names selected by `filter`.
    ///
    /// `All` yields first-party accounts whose `active` flag equals
    /// `active`, ordered by name. `Named` is returned unchanged.
    pub async fn resolve(
        &self,
        filter: &NameFilter,
        active: bool,
    ) -> Result<Vec<String>, StoreError> {
        match filter {
            NameFilter::Named(names) => Ok(names.clone()),
            NameFilter::All => {
                let mut names: Vec<String> = self
                    .store
                    .list_accounts()
                    .await?
                    .into_iter()
                    .filter(|a| !a.third_party && a.active == active)
                    .map(|a| a.name)
                    .collect();
                names.sort();
                Ok(names)
            }
        }
    }
}

/// Technology names selected by `filter`.
///
/// `All` is every registered technology. Explicit names unknown to the
/// registry are dropped with a warning.
pub fn resolve_technologies(filter: &NameFilter, registry: &TechnologyRegistry) -> Vec<String> {
    match filter {
        NameFilter::All => registry.names(),
        NameFilter::Named(names) => names
            .iter()
            .filter(|name| {
                let known = registry.contains(name);
                if !known {
                    tracing::warn!(technology = %name, "Ignoring unregistered technology");
                }
                known
            })
            .cloned()
            .collect(),
    }
}
