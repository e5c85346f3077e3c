//! # Interval Gate
//!
//! Decides whether a pair is due. A pair is due when its technology is
//! active and either it has never completed a run or its last run finished
//! at least one polling interval ago. A technology without a stored config
//! counts as active with the engine's default interval.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use secmon_core::{LastRun, Pair, PollingInterval, TechnologyConfig};
use secmon_store::{Datastore, StoreError};

/// Due-ness check backed by the store.
#[derive(Clone)]
pub struct IntervalGate {
    store: Arc<dyn Datastore>,
    default_interval: PollingInterval,
}

impl IntervalGate {
    /// Create a gate. `default_interval` applies to technologies with no
    /// stored config.
    pub fn new(store: Arc<dyn Datastore>, default_interval: PollingInterval) -> Self {
        Self {
            store,
            default_interval,
        }
    }

    /// Whether `pair` should run at `now`.
    pub async fn is_due(&self, pair: &Pair, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let config = self.store.technology_config(&pair.technology).await?;
        let last = self.store.last_run(pair).await?;
        Ok(is_due(
            config.as_ref(),
            last.as_ref(),
            self.default_interval,
            now,
        ))
    }
}

/// The gate rule over already-loaded records.
pub fn is_due(
    config: Option<&TechnologyConfig>,
    last: Option<&LastRun>,
    default_interval: PollingInterval,
    now: DateTime<Utc>,
) -> bool {
    let (active, interval) = match config {
        Some(c) => (c.active, c.interval),
        None => (true, default_interval),
    };
    if !active {
        return false;
    }
    match last {
        None => true,
        Some(run) => now - run.finished_at >= interval.as_duration(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use secmon_core::RunOutcome;
    use secmon_store::MemoryStore;

    fn pair() -> Pair {
        Pair::new("prod", "s3")
    }

    fn finished(at: DateTime<Utc>) -> LastRun {
        LastRun::next(None, pair(), RunOutcome::Success, None, at, 5)
    }

    #[test]
    fn never_run_is_due() {
        let config = TechnologyConfig::new("s3", PollingInterval::Hourly);
        assert!(is_due(Some(&config), None, PollingInterval::Daily, Utc::now()));
    }

    #[test]
    fn hourly_interval_is_honoured() {
        let now = Utc::now();
        let config = TechnologyConfig::new("s3", PollingInterval::Hourly);
        let recent = finished(now - Duration::minutes(30));
        let stale = finished(now - Duration::minutes(61));
        let exact = finished(now - Duration::minutes(60));
        assert!(!is_due(Some(&config), Some(&recent), PollingInterval::Daily, now));
        assert!(is_due(Some(&config), Some(&stale), PollingInterval::Daily, now));
        assert!(is_due(Some(&config), Some(&exact), PollingInterval::Daily, now));
    }

    #[test]
    fn inactive_technology_is_never_due() {
        let mut config = TechnologyConfig::new("s3", PollingInterval::FifteenMinutes);
        config.active = false;
        assert!(!is_due(Some(&config), None, PollingInterval::Daily, Utc::now()));
    }

    #[test]
    fn missing_config_uses_default_interval() {
        let now = Utc::now();
        let last = finished(now - Duration::hours(23));
        assert!(!is_due(None, Some(&last), PollingInterval::Daily, now));
        assert!(is_due(None, Some(&last), PollingInterval::TwelveHours, now));
    }

    #[tokio::test]
    async fn gate_reads_config_and_last_run_from_store() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        store
            .upsert_technology_config(&TechnologyConfig::new("s3", PollingInterval::Hourly))
            .await
            .unwrap();
        let gate = IntervalGate::new(store.clone(), PollingInterval::Daily);
        assert!(gate.is_due(&pair(), now).await.unwrap());

        store
            .record_last_run(&finished(now - Duration::minutes(30)))
            .await
            .unwrap();
        assert!(!gate.is_due(&pair(), now).await.unwrap());
        assert!(gate.is_due(&pair(), now + Duration::minutes(31)).await.unwrap());
    }

    #[tokio::test]
    async fn disabled_technology_in_store_is_not_due() {
        let store = Arc::new(MemoryStore::new());
        let mut config = TechnologyConfig::new("s3", PollingInterval::FifteenMinutes);
        config.active = false;
        store.upsert_technology_config(&config).await.unwrap();
        let gate = IntervalGate::new(store, PollingInterval::Daily);
        assert!(!gate.is_due(&pair(), Utc::now()).await.unwrap());
    }
}
