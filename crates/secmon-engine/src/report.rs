//! # Reporting Hook
//!
//! After a cycle the coordinator hands its summary to a [`ReportSink`].
//! Delivery failures are logged and recorded; they never undo or retry
//! anything the cycle already stored.

use async_trait::async_trait;
use tracing::info;

use crate::coordinator::CycleSummary;
use crate::error::ReportError;

/// Receives cycle summaries.
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Deliver one summary.
    async fn deliver(&self, summary: &CycleSummary) -> Result<(), ReportError>;
}

/// Writes the summary to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReportSink;

#[async_trait]
impl ReportSink for LogReportSink {
    async fn deliver(&self, summary: &CycleSummary) -> Result<(), ReportError> {
        info!(
            attempted = summary.attempted,
            succeeded = summary.succeeded,
            failed = summary.failed,
            revisions_written = summary.revisions_written,
            issues_opened = summary.issues_opened,
            issues_closed = summary.issues_closed,
            needs_attention = summary.needs_attention.len(),
            "Cycle report"
        );
        for pair in &summary.needs_attention {
            info!(account = %pair.account, technology = %pair.technology, "Pair needs attention");
        }
        Ok(())
    }
}
