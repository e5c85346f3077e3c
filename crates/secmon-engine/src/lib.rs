//! # secmon-engine: Scheduling and Reconciliation
//!
//! Decides which (account, technology) pairs are due, runs their watch and
//! audit passes with bounded concurrency, and merges findings into
//! persistent issue state.
//!
//! ## Components
//!
//! - [`selector`]: resolves `all` or explicit name lists.
//! - [`registry`]: watcher and auditor plugins by technology name.
//! - [`gate`]: whether a pair is due.
//! - [`coordinator`]: one cycle over the selected pairs.
//! - [`detector`]: watcher output to item revisions.
//! - [`reconciler`]: auditor findings to issues.
//! - [`lifecycle`]: account create, update, enable, disable.
//! - [`scheduler`]: the recurring driver.
//! - [`admin`], [`export`], [`report`]: operator surfaces.
//!
//! Nothing here is global. An [`EngineContext`] carries the store, registry,
//! pair locks and configuration, and is passed to every component.

#![deny(missing_docs)]

pub mod admin;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod detector;
pub mod error;
pub mod export;
pub mod gate;
pub mod lifecycle;
pub mod locks;
pub mod reconciler;
pub mod registry;
pub mod report;
pub mod scheduler;
pub mod selector;

pub use admin::{Admin, DeletionReport, ExportReport};
pub use config::{ConfigError, EngineConfig};
pub use context::EngineContext;
pub use coordinator::{CycleRequest, CycleSummary, PairFailure, RunCoordinator, RunMode};
pub use detector::{ChangeDetector, ChangeSet};
pub use error::{
    AdminError, CollectorError, EngineError, EvaluatorError, ExportError, RegistryError,
    ReportError,
};
pub use export::{ExportSink, JsonDirectorySink};
pub use gate::IntervalGate;
pub use lifecycle::{AccountLifecycleManager, ActivationReport, UpsertOutcome};
pub use locks::{PairGuard, PairLocks};
pub use reconciler::{AuditorFailure, IssueReconciler, ReconcileOutcome};
pub use registry::{Auditor, RegistryBuilder, TechnologyRegistry, Watcher};
pub use report::{LogReportSink, ReportSink};
pub use scheduler::Scheduler;
pub use selector::{resolve_technologies, AccountSelector, NameFilter};
