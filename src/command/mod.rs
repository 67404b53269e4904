//! The command pipeline: validate the requested operation, verify access
//! with the authority, delegate to the backend store, and pair the outcome
//! with its audit record.
//!
//! Each inbound operation runs the pipeline exactly once and the whole run
//! is terminal on first failure.  The audit record travels in the returned
//! [`Outcome`] rather than through any ambient context, so the audit
//! contract is visible in the signature and testable directly.

pub mod args;
pub mod discover;
pub mod personaltoken;
pub mod readwriter;
pub mod uploadarchive;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::api::accessverifier::AccessVerifier;
use crate::api::discover::DiscoverClient;
use crate::api::token::TokenClient;
use crate::audit::AuditRecord;
use crate::backend::Backend;
use crate::command::args::{OperationRequest, Principal};
use crate::command::readwriter::ReadWriter;
use crate::error::GateError;

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Result of one pipeline run: the operation's outcome plus the audit record
/// for the access decision, when one was made.
///
/// The record is present whenever the authority approved the operation,
/// including runs where the backend call afterwards failed, because the
/// access decision already happened and must be recorded.
pub struct Outcome {
    pub audit: Option<AuditRecord>,
    pub result: Result<(), GateError>,
}

impl Outcome {
    pub fn success() -> Self {
        Self {
            audit: None,
            result: Ok(()),
        }
    }

    pub fn failure(error: GateError) -> Self {
        Self {
            audit: None,
            result: Err(error),
        }
    }

    pub fn audited(audit: AuditRecord, result: Result<(), GateError>) -> Self {
        Self {
            audit: Some(audit),
            result,
        }
    }
}

// ---------------------------------------------------------------------------
// Context and dispatch
// ---------------------------------------------------------------------------

/// Everything a command needs: the caller's identity plus the collaborator
/// clients, all request-scoped or read-only.
pub struct CommandContext {
    pub principal: Principal,
    pub verifier: AccessVerifier,
    pub tokens: TokenClient,
    pub discover: DiscoverClient,
    pub backend: Arc<dyn Backend>,
}

/// Route one parsed operation to its command.  Unknown operation names are
/// rejected without any network call.
pub async fn dispatch(
    ctx: &CommandContext,
    op: &OperationRequest,
    streams: &mut ReadWriter,
    trace_id: &str,
    cancel: &CancellationToken,
) -> Outcome {
    match op.name.as_str() {
        uploadarchive::COMMAND => {
            uploadarchive::execute(ctx, op, streams, trace_id, cancel).await
        }
        personaltoken::COMMAND => {
            personaltoken::execute(ctx, op, streams, trace_id, cancel).await
        }
        discover::COMMAND => discover::execute(ctx, op, streams, trace_id, cancel).await,
        _ => Outcome::failure(GateError::disallowed_command()),
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Write one line to a session stream, mapping stream failures into the
/// transport error kind.
pub(crate) async fn write_line(
    stream: &mut (dyn tokio::io::AsyncWrite + Send + Unpin),
    line: &str,
) -> Result<(), GateError> {
    use tokio::io::AsyncWriteExt;

    let mut bytes = line.as_bytes().to_vec();
    bytes.push(b'\n');
    stream
        .write_all(&bytes)
        .await
        .map_err(|err| GateError::Transport(format!("session stream: {err}")))?;
    stream
        .flush()
        .await
        .map_err(|err| GateError::Transport(format!("session stream: {err}")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------


#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    use tokio_util::sync::CancellationToken;

    use super::testing::{context_for, RecordingBackend};
    use super::*;
    use crate::command::args::parse_command;
    use crate::command::readwriter::testing::in_memory;

    #[tokio::test]
    async fn unknown_operations_are_disallowed_without_network() {
        let server = mockito::Server::new_async().await;
        let backend = Arc::new(RecordingBackend::default());
        let ctx = context_for(
            &server,
            Principal::KeyId("0".to_string()),
            Arc::clone(&backend),
        );
        let op = parse_command("rm -rf /").unwrap();
        let (mut streams, _out, _err) = in_memory(b"");

        let outcome = dispatch(&ctx, &op, &mut streams, "trace", &CancellationToken::new()).await;

        assert_eq!(
            outcome.result.unwrap_err().to_string(),
            "Disallowed command"
        );
        assert!(outcome.audit.is_none());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }
}
