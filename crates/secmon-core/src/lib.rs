#![deny(missing_docs)]

//! # secmon-core: Foundational Types
//!
//! Every other crate in the workspace depends on this one. It has no internal
//! crate dependencies; externally it uses `serde`, `serde_json`,
//! `thiserror`, `chrono`, `uuid` and `sha2`.
//!
//! ## Design Principles
//!
//! 1. **One record type per persisted entity.** [`Account`],
//!    [`TechnologyConfig`], [`ItemRevision`], [`Issue`], [`LastRun`] and
//!    [`ExceptionEntry`] are the only shapes the store reads and writes.
//!
//! 2. **[`CanonicalBytes`] is the sole path to digest computation.** Resource
//!    representations are hashed only after key sorting and ephemeral-field
//!    removal, so two collections of the same resource hash identically.
//!
//! 3. **Polling intervals are a closed set.** [`PollingInterval`] cannot be
//!    constructed from an arbitrary number of minutes.
//!
//! 4. **[`SecmonError`] hierarchy.** Structured errors with `thiserror`. No
//!    `Box<dyn Error>`, no `.unwrap()` outside tests.

pub mod account;
pub mod canonical;
pub mod digest;
pub mod error;
pub mod exception;
pub mod issue;
pub mod item;
pub mod run;
pub mod technology;

// Re-export primary types at crate root for ergonomic imports.
pub use account::{Account, AccountSpec, DEFAULT_ACCOUNT_TYPE};
pub use canonical::{strip_ephemeral, CanonicalBytes};
pub use digest::sha256_hex;
pub use error::{CanonicalizationError, SecmonError, ValidationError};
pub use exception::{ExceptionEntry, ExceptionSource};
pub use issue::{Finding, Issue, IssueKey, IssueStatus, Severity, SubFinding};
pub use item::{CollectedItem, ItemRevision, RevisionState};
pub use run::{LastRun, Pair, RunOutcome};
pub use technology::{PollingInterval, TechnologyConfig};
