use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pipeline::{Outcome, Submission};
use crate::verdict::Status;

/// Result of one recorded capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditResponse {
    /// `pass`, `fail` or `system_error` (no model answered; resubmit)
    pub outcome: Outcome,
    pub category: String,
    pub result: Status,
    pub reason: String,
    pub image_url: String,
    pub created_at: DateTime<Utc>,
}

impl From<Submission> for AuditResponse {
    fn from(submission: Submission) -> Self {
        Self {
            outcome: submission.outcome(),
            category: submission.record.audit_type,
            result: submission.record.result,
            reason: submission.record.reason,
            image_url: submission.record.image_url,
            created_at: submission.record.created_at,
        }
    }
}
