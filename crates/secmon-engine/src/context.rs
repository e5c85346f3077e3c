//! # Engine Context
//!
//! The shared handles every component needs, passed explicitly instead of
//! living in globals. Cloning is cheap: everything inside is reference
//! counted.

use std::future::Future;
use std::sync::Arc;

use secmon_store::{Datastore, StoreError};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::locks::PairLocks;
use crate::registry::TechnologyRegistry;

/// Store, registry, pair locks and configuration.
#[derive(Clone)]
pub struct EngineContext {
    /// Persistent state.
    pub store: Arc<dyn Datastore>,
    /// Registered watchers and auditors.
    pub registry: Arc<TechnologyRegistry>,
    /// Pairs currently running.
    pub locks: PairLocks,
    /// Tunables.
    pub config: Arc<EngineConfig>,
}

impl EngineContext {
    /// Assemble a context with a fresh lock table.
    pub fn new(
        store: Arc<dyn Datastore>,
        registry: Arc<TechnologyRegistry>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            registry,
            locks: PairLocks::new(),
            config: Arc::new(config),
        }
    }

    /// Await a store call, failing with [`EngineError::StoreTimeout`] once
    /// the configured store timeout has elapsed.
    pub async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, EngineError> {
        let limit = self.config.store_timeout();
        match tokio::time::timeout(limit, call).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(EngineError::StoreTimeout(limit)),
        }
    }
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("registry", &self.registry)
            .field("locks", &self.locks)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
