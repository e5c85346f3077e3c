//! # Scheduler
//!
//! Recurring driver: on every tick a new cycle is spawned as its own task,
//! so a slow pair never holds back the next tick. The coordinator's shared
//! semaphore bounds total concurrency and its pair locks keep overlapping
//! cycles off the same pair.
//!
//! When the shutdown future resolves, the coordinator stops dispatching and
//! the scheduler waits for every cycle still running.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, instrument};

use crate::coordinator::{CycleRequest, CycleSummary, RunCoordinator};

/// Ticks the coordinator until shut down.
pub struct Scheduler {
    coordinator: RunCoordinator,
    request: CycleRequest,
    tick: Duration,
}

impl Scheduler {
    /// Schedule `request` on the coordinator's configured tick.
    pub fn new(coordinator: RunCoordinator, request: CycleRequest) -> Self {
        let tick = coordinator.context().config.tick();
        Self {
            coordinator,
            request,
            tick,
        }
    }

    /// Override the tick period.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Run until `shutdown` resolves, then drain in-flight cycles. Returns
    /// the number of cycles that completed.
    #[instrument(skip_all, fields(tick_secs = self.tick.as_secs()))]
    pub async fn run(&self, shutdown: impl Future<Output = ()>) -> usize {
        info!("Starting scheduler");
        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cycles: JoinSet<Option<CycleSummary>> = JoinSet::new();
        let mut completed = 0;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    self.coordinator.shutdown();
                    break;
                }
                _ = ticker.tick() => {
                    if self.coordinator.is_shutdown() {
                        break;
                    }
                    let coordinator = self.coordinator.clone();
                    let request = self.request.clone();
                    cycles.spawn(async move {
                        match coordinator.run_cycle(request).await {
                            Ok(summary) => Some(summary),
                            Err(e) => {
                                error!(error = %e, "Cycle could not start");
                                None
                            }
                        }
                    });
                }
                Some(joined) = cycles.join_next(), if !cycles.is_empty() => {
                    completed += count_completed(joined);
                }
            }
        }

        info!(in_flight = cycles.len(), "Waiting for in-flight cycles to complete");
        while let Some(joined) = cycles.join_next().await {
            completed += count_completed(joined);
        }
        info!(completed, "Scheduler stopped");
        completed
    }
}

fn count_completed(joined: Result<Option<CycleSummary>, tokio::task::JoinError>) -> usize {
    match joined {
        Ok(Some(_)) => 1,
        Ok(None) => 0,
        Err(e) => {
            error!(error = %e, "Cycle task aborted");
            0
        }
    }
}
