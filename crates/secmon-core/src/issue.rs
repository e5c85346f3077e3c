//! # Issues
//!
//! An issue is an auditor finding that has been merged into persistent state.
//! Auditors produce [`Finding`]s on every pass; the reconciler turns them into
//! [`Issue`]s keyed by [`IssueKey`], so re-detection of the same problem
//! refreshes one record instead of creating another.
//!
//! ## Invariants
//!
//! - At most one open issue per (account, technology, resource key, rule id).
//! - `justified`, `justification`, `justified_by` and `justified_at` are only
//!   changed by [`Issue::justify`] / [`Issue::unjustify`], never by a refresh.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::run::Pair;

/// How serious a finding is. Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational.
    Info,
    /// Low.
    Low,
    /// Medium.
    Medium,
    /// High.
    High,
    /// Critical.
    Critical,
}

impl Severity {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(Self::Info),
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(ValidationError::UnknownVariant {
                kind: "severity",
                value: other.to_string(),
            }),
        }
    }
}

/// Whether an issue is still being reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    /// Reported by the latest successful audit pass.
    Open,
    /// No longer reported; kept for history.
    Closed,
}

impl IssueStatus {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

impl std::str::FromStr for IssueStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            other => Err(ValidationError::UnknownVariant {
                kind: "issue status",
                value: other.to_string(),
            }),
        }
    }
}

/// A contributing resource or detail behind an issue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubFinding {
    /// Key of the related resource (may equal the issue's own resource).
    pub resource_key: String,
    /// What about it contributes to the issue.
    pub detail: String,
}

impl SubFinding {
    /// Create a sub-finding.
    pub fn new(resource_key: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            resource_key: resource_key.into(),
            detail: detail.into(),
        }
    }
}

/// The identity of an issue within its pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IssueKey {
    /// Natural key of the offending resource.
    pub resource_key: String,
    /// Identifier of the rule that flagged it.
    pub rule_id: String,
}

impl IssueKey {
    /// Create an issue key.
    pub fn new(resource_key: impl Into<String>, rule_id: impl Into<String>) -> Self {
        Self {
            resource_key: resource_key.into(),
            rule_id: rule_id.into(),
        }
    }
}

impl std::fmt::Display for IssueKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.resource_key, self.rule_id)
    }
}

/// A candidate issue produced by one auditor pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Natural key of the offending resource.
    pub resource_key: String,
    /// Identifier of the rule.
    pub rule_id: String,
    /// Severity.
    pub severity: Severity,
    /// One-line description.
    pub summary: String,
    /// Structured evidence.
    #[serde(default)]
    pub evidence: serde_json::Value,
    /// Contributing sub-findings.
    #[serde(default)]
    pub sub_findings: BTreeSet<SubFinding>,
}

impl Finding {
    /// Create a finding with null evidence and no sub-findings.
    pub fn new(
        resource_key: impl Into<String>,
        rule_id: impl Into<String>,
        severity: Severity,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            resource_key: resource_key.into(),
            rule_id: rule_id.into(),
            severity,
            summary: summary.into(),
            evidence: serde_json::Value::Null,
            sub_findings: BTreeSet::new(),
        }
    }

    /// Builder: attach evidence.
    pub fn with_evidence(mut self, evidence: serde_json::Value) -> Self {
        self.evidence = evidence;
        self
    }

    /// Builder: add a sub-finding.
    pub fn with_sub_finding(mut self, sub: SubFinding) -> Self {
        self.sub_findings.insert(sub);
        self
    }

    /// The key this finding reconciles against.
    pub fn key(&self) -> IssueKey {
        IssueKey::new(self.resource_key.clone(), self.rule_id.clone())
    }

    /// Fold a duplicate finding for the same key into this one: the higher
    /// severity wins and sub-findings are unioned.
    pub fn absorb(&mut self, other: Finding) {
        if other.severity > self.severity {
            self.severity = other.severity;
            self.summary = other.summary;
            self.evidence = other.evidence;
        }
        self.sub_findings.extend(other.sub_findings);
    }
}

/// A persisted issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    /// Unique issue identifier.
    pub id: Uuid,
    /// Owning account name.
    pub account: String,
    /// Owning technology name.
    pub technology: String,
    /// Natural key of the offending resource.
    pub resource_key: String,
    /// Identifier of the rule.
    pub rule_id: String,
    /// Name of the auditor that produced the rule.
    pub auditor: String,
    /// Severity of the latest detection.
    pub severity: Severity,
    /// Description of the latest detection.
    pub summary: String,
    /// Evidence of the latest detection.
    pub evidence: serde_json::Value,
    /// Whether an operator has accepted this issue.
    pub justified: bool,
    /// Operator-entered justification text.
    pub justification: Option<String>,
    /// Who justified the issue.
    pub justified_by: Option<String>,
    /// When the issue was justified.
    pub justified_at: Option<DateTime<Utc>>,
    /// Contributing sub-findings of the latest detection.
    pub sub_findings: BTreeSet<SubFinding>,
    /// Open or closed.
    pub status: IssueStatus,
    /// First detection.
    pub first_seen: DateTime<Utc>,
    /// Latest detection.
    pub last_seen: DateTime<Utc>,
    /// When the issue stopped being reported.
    pub closed_at: Option<DateTime<Utc>>,
}

impl Issue {
    /// Open a new, unjustified issue from a finding.
    pub fn open(pair: &Pair, auditor: &str, finding: Finding, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            account: pair.account.clone(),
            technology: pair.technology.clone(),
            resource_key: finding.resource_key,
            rule_id: finding.rule_id,
            auditor: auditor.to_string(),
            severity: finding.severity,
            summary: finding.summary,
            evidence: finding.evidence,
            justified: false,
            justification: None,
            justified_by: None,
            justified_at: None,
            sub_findings: finding.sub_findings,
            status: IssueStatus::Open,
            first_seen: now,
            last_seen: now,
            closed_at: None,
        }
    }

    /// Update evidence and timestamp from a re-detection. Justification
    /// fields are untouched.
    pub fn refresh(&mut self, auditor: &str, finding: Finding, now: DateTime<Utc>) {
        self.auditor = auditor.to_string();
        self.severity = finding.severity;
        self.summary = finding.summary;
        self.evidence = finding.evidence;
        self.sub_findings = finding.sub_findings;
        self.last_seen = now;
    }

    /// Mark the issue as no longer reported.
    pub fn close(&mut self, now: DateTime<Utc>) {
        self.status = IssueStatus::Closed;
        self.closed_at = Some(now);
    }

    /// Record an operator justification.
    pub fn justify(&mut self, text: impl Into<String>, by: Option<String>, now: DateTime<Utc>) {
        self.justified = true;
        self.justification = Some(text.into());
        self.justified_by = by;
        self.justified_at = Some(now);
    }

    /// Withdraw a justification.
    pub fn unjustify(&mut self) {
        self.justified = false;
        self.justification = None;
        self.justified_by = None;
        self.justified_at = None;
    }

    /// The key this issue reconciles against.
    pub fn key(&self) -> IssueKey {
        IssueKey::new(self.resource_key.clone(), self.rule_id.clone())
    }

    /// Whether the issue is open.
    pub fn is_open(&self) -> bool {
        self.status == IssueStatus::Open
    }

    /// The pair this issue belongs to.
    pub fn pair(&self) -> Pair {
        Pair::new(self.account.clone(), self.technology.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn finding(severity: Severity) -> Finding {
        Finding::new("sg-1", "open-ingress", severity, "0.0.0.0/0 on port 22")
    }

    #[test]
    fn severity_orders_by_seriousness() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::Low > Severity::Info);
        assert_eq!("medium".parse::<Severity>(), Ok(Severity::Medium));
    }

    #[test]
    fn refresh_preserves_justification() {
        let pair = Pair::new("prod", "securitygroup");
        let t0 = Utc::now() - chrono::Duration::hours(2);
        let mut issue = Issue::open(&pair, "sg-auditor", finding(Severity::Medium), t0);
        issue.justify("bastion host", Some("ops@example.com".into()), t0);

        let now = Utc::now();
        issue.refresh(
            "sg-auditor",
            finding(Severity::High).with_evidence(json!({"port": 22})),
            now,
        );

        assert!(issue.justified);
        assert_eq!(issue.justification.as_deref(), Some("bastion host"));
        assert_eq!(issue.justified_at, Some(t0));
        assert_eq!(issue.severity, Severity::High);
        assert_eq!(issue.evidence, json!({"port": 22}));
        assert_eq!(issue.first_seen, t0);
        assert_eq!(issue.last_seen, now);
    }

    #[test]
    fn absorb_keeps_higher_severity_and_unions_sub_findings() {
        let mut a = finding(Severity::Low).with_sub_finding(SubFinding::new("sg-1", "port 22"));
        let b = finding(Severity::Critical).with_sub_finding(SubFinding::new("sg-1", "port 3389"));
        a.absorb(b);
        assert_eq!(a.severity, Severity::Critical);
        assert_eq!(a.sub_findings.len(), 2);

        let mut c = finding(Severity::High);
        c.absorb(finding(Severity::Low));
        assert_eq!(c.severity, Severity::High);
    }

    #[test]
    fn close_sets_status_and_time() {
        let mut issue = Issue::open(&Pair::new("a", "t"), "x", finding(Severity::Info), Utc::now());
        assert!(issue.is_open());
        issue.close(Utc::now());
        assert_eq!(issue.status, IssueStatus::Closed);
        assert!(issue.closed_at.is_some());
    }

    #[test]
    fn unjustify_clears_all_justification_fields() {
        let mut issue = Issue::open(&Pair::new("a", "t"), "x", finding(Severity::Info), Utc::now());
        issue.justify("accepted", None, Utc::now());
        issue.unjustify();
        assert!(!issue.justified);
        assert!(issue.justification.is_none());
        assert!(issue.justified_at.is_none());
    }

    #[test]
    fn issue_key_display() {
        assert_eq!(IssueKey::new("sg-1", "open-ingress").to_string(), "sg-1#open-ingress");
    }
}
