use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::SigningError;

/// One entry of the append-only action log: who did what to which document,
/// and when.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub document_id: String,
    /// `None` for actions taken through the public signing flow.
    pub user_id: Option<String>,
    /// e.g. `"placed"`, `"signed"`, `"rejected"`, `"finalized"`.
    pub action: String,
    /// Seconds since the Unix epoch.
    pub at: i64,
}

impl AuditEntry {
    pub fn new(document_id: &str, user_id: Option<&str>, action: &str) -> AuditEntry {
        AuditEntry {
            document_id: document_id.to_string(),
            user_id: user_id.map(str::to_string),
            action: action.to_string(),
            at: OffsetDateTime::now_utc().unix_timestamp(),
        }
    }
}

/// The seam to the audit collaborator. Recording is a pure side effect: the
/// service logs a failed `record` and carries on, it never fails the
/// operation that triggered it.
pub trait AuditSink {
    fn record(&self, entry: AuditEntry) -> Result<(), SigningError>;
}

/// A sink that reports entries through the log facade, for deployments where
/// the real audit store lives elsewhere.
#[derive(Default)]
pub struct LogSink;

impl AuditSink for LogSink {
    fn record(&self, entry: AuditEntry) -> Result<(), SigningError> {
        log::info!(
            "audit: {} on document {:?} by {}",
            entry.action,
            entry.document_id,
            entry.user_id.as_deref().unwrap_or("an anonymous signer"),
        );
        Ok(())
    }
}
