//! Audit records for authorized operations.
//!
//! One record per inbound operation, built from the authority's approval and
//! emitted to the audit sink keyed by the correlation id.  The record is
//! written whenever an access decision was made, including when the backend
//! call that followed it failed.

use tracing::info;

use crate::api::accessverifier::Approval;

/// Flat audit record for one authorized operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    pub username: String,
    pub project_path: String,
    pub project_id: u64,
    pub root_namespace_id: u64,
}

impl AuditRecord {
    pub fn from_approval(approval: &Approval) -> Self {
        Self {
            username: approval.username.clone(),
            project_path: approval.project_path.clone(),
            project_id: approval.project_id,
            root_namespace_id: approval.root_namespace_id,
        }
    }
}

/// Emit `record` to the audit sink.
pub fn emit(trace_id: &str, record: &AuditRecord) {
    info!(
        target: "audit",
        correlation_id = %trace_id,
        username = %record.username,
        project_path = %record.project_path,
        project_id = record.project_id,
        root_namespace_id = record.root_namespace_id,
        "operation authorized"
    );
}
