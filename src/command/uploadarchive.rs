//! Archive fetch: `git-upload-archive <repository>`.

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::audit::AuditRecord;
use crate::command::args::OperationRequest;
use crate::command::readwriter::ReadWriter;
use crate::command::{CommandContext, Outcome};
use crate::error::GateError;

pub const COMMAND: &str = "git-upload-archive";

/// Verify access to the requested repository, then relay the archive
/// exchange to the backend store.
pub async fn execute(
    ctx: &CommandContext,
    op: &OperationRequest,
    streams: &mut ReadWriter,
    trace_id: &str,
    cancel: &CancellationToken,
) -> Outcome {
    if op.args.len() != 2 {
        return Outcome::failure(GateError::disallowed_command());
    }
    let repo = &op.args[1];

    let approval = match ctx
        .verifier
        .verify(&ctx.principal, COMMAND, repo, trace_id, cancel)
        .await
    {
        Ok(approval) => approval,
        Err(err) => return Outcome::failure(err),
    };

    debug!(repo = %repo, username = %approval.username, "archive fetch approved");

    // The access decision is recorded even if the store call below fails.
    let audit = AuditRecord::from_approval(&approval);
    let result = ctx
        .backend
        .run(&approval.backend, COMMAND, streams, trace_id, cancel)
        .await;

    Outcome::audited(audit, result)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
