//! # Issue Reconciliation
//!
//! Merges one audit pass into persistent issue state for a pair.
//!
//! ## Rules
//!
//! 1. Every auditor registered for the technology runs over the pair's live
//!    items, each under its own timeout. A failing auditor is recorded and
//!    skipped; the others still apply.
//! 2. Candidates with the same (resource key, rule id) are merged: the
//!    highest severity wins and sub-findings are unioned.
//! 3. A candidate matching an open issue refreshes it in place. Justification
//!    fields are never touched by a refresh.
//! 4. Any other candidate opens a new, unjustified issue.
//! 5. An open issue with no matching candidate is closed, but only if the
//!    auditor that produced it succeeded in this pass.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use secmon_core::{Finding, Issue, IssueKey, IssueStatus, ItemRevision, Pair};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::context::EngineContext;
use crate::error::{EngineError, EvaluatorError};

/// An auditor that did not complete.
#[derive(Debug, Clone)]
pub struct AuditorFailure {
    /// Auditor name.
    pub auditor: String,
    /// What went wrong.
    pub error: EvaluatorError,
}

/// Result of reconciling one pair.
#[derive(Debug, Clone, Default)]
pub struct ReconcileOutcome {
    /// Open issues of the pair after the merge, ordered by key.
    pub open: Vec<Issue>,
    /// Ids of issues created in this pass.
    pub opened: Vec<Uuid>,
    /// Ids of open issues refreshed in this pass.
    pub refreshed: Vec<Uuid>,
    /// Ids of issues closed in this pass.
    pub closed: Vec<Uuid>,
    /// Auditors that failed or timed out.
    pub auditor_failures: Vec<AuditorFailure>,
}

/// Runs auditors and merges their findings into stored issues.
pub struct IssueReconciler<'a> {
    ctx: &'a EngineContext,
}

impl<'a> IssueReconciler<'a> {
    /// Create a reconciler over `ctx`.
    pub fn new(ctx: &'a EngineContext) -> Self {
        Self { ctx }
    }

    /// Audit `items` (the pair's live revisions) and reconcile the result.
    pub async fn reconcile(
        &self,
        pair: &Pair,
        items: &[ItemRevision],
        now: DateTime<Utc>,
    ) -> Result<ReconcileOutcome, EngineError> {
        let mut outcome = ReconcileOutcome::default();
        let mut succeeded: HashSet<String> = HashSet::new();
        let mut candidates: BTreeMap<IssueKey, (String, Finding)> = BTreeMap::new();

        let limit = self.ctx.config.auditor_timeout();
        for auditor in self.ctx.registry.auditors(&pair.technology) {
            let name = auditor.name().to_string();
            let result = match tokio::time::timeout(limit, auditor.evaluate(items)).await {
                Ok(result) => result,
                Err(_) => Err(EvaluatorError::Timeout(limit)),
            };
            match result {
                Ok(findings) => {
                    for finding in findings {
                        merge_candidate(&mut candidates, &name, finding);
                    }
                    succeeded.insert(name);
                }
                Err(error) => {
                    warn!(
                        account = %pair.account,
                        technology = %pair.technology,
                        auditor = %name,
                        error = %error,
                        "Auditor failed; its issues are left as they are"
                    );
                    outcome.auditor_failures.push(AuditorFailure {
                        auditor: name,
                        error,
                    });
                }
            }
        }

        let stored = self
            .ctx
            .bounded(self.ctx.store.issues(pair, Some(IssueStatus::Open)))
            .await?;
        let mut existing = index_open_issues(pair, stored);

        let mut open = Vec::new();
        for (key, (auditor, finding)) in candidates {
            match existing.remove(&key) {
                Some(mut issue) => {
                    issue.refresh(&auditor, finding, now);
                    match self.ctx.bounded(self.ctx.store.refresh_issue(&issue)).await? {
                        Some(stored) => {
                            outcome.refreshed.push(stored.id);
                            open.push(stored);
                        }
                        None => debug!(
                            account = %pair.account,
                            technology = %pair.technology,
                            issue = %issue.id,
                            "Issue was deleted during reconciliation; not recreated"
                        ),
                    }
                }
                None => {
                    let issue = Issue::open(pair, &auditor, finding, now);
                    self.ctx.bounded(self.ctx.store.upsert_issue(&issue)).await?;
                    outcome.opened.push(issue.id);
                    open.push(issue);
                }
            }
        }

        for (_, mut issue) in existing {
            if succeeded.contains(&issue.auditor) {
                issue.close(now);
                if self
                    .ctx
                    .bounded(self.ctx.store.refresh_issue(&issue))
                    .await?
                    .is_some()
                {
                    outcome.closed.push(issue.id);
                }
            } else {
                open.push(issue);
            }
        }

        open.sort_by(|a, b| a.key().cmp(&b.key()));
        outcome.open = open;
        debug!(
            account = %pair.account,
            technology = %pair.technology,
            opened = outcome.opened.len(),
            refreshed = outcome.refreshed.len(),
            closed = outcome.closed.len(),
            "Reconciliation complete"
        );
        Ok(outcome)
    }
}

/// Key the open issues of `pair`. The store guarantees one open issue per
/// key; if it ever holds more, the first is kept and the rest are logged.
fn index_open_issues(pair: &Pair, issues: Vec<Issue>) -> HashMap<IssueKey, Issue> {
    let mut existing: HashMap<IssueKey, Issue> = HashMap::new();
    for issue in issues {
        match existing.entry(issue.key()) {
            Entry::Vacant(slot) => {
                slot.insert(issue);
            }
            Entry::Occupied(kept) => warn!(
                account = %pair.account,
                technology = %pair.technology,
                key = %kept.key(),
                kept = %kept.get().id,
                ignored = %issue.id,
                "Store holds two open issues for one key; ignoring the later one"
            ),
        }
    }
    existing
}

/// Fold `finding` into the candidate set. The first auditor to report a key
/// keeps ownership of it.
fn merge_candidate(
    candidates: &mut BTreeMap<IssueKey, (String, Finding)>,
    auditor: &str,
    finding: Finding,
) {
    match candidates.get_mut(&finding.key()) {
        Some((_, merged)) => merged.absorb(finding),
        None => {
            candidates.insert(finding.key(), (auditor.to_string(), finding));
        }
    }
}
