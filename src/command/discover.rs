//! Identity discovery: `discover` greets the caller with their resolved
//! account name, which doubles as a connectivity check for new users.

use tokio_util::sync::CancellationToken;

use crate::command::args::OperationRequest;
use crate::command::readwriter::ReadWriter;
use crate::command::{write_line, CommandContext, Outcome};
use crate::error::GateError;

pub const COMMAND: &str = "discover";

pub async fn execute(
    ctx: &CommandContext,
    op: &OperationRequest,
    streams: &mut ReadWriter,
    trace_id: &str,
    cancel: &CancellationToken,
) -> Outcome {
    if op.args.len() != 1 {
        return Outcome::failure(GateError::disallowed_command());
    }

    let identity = match ctx.discover.discover(&ctx.principal, trace_id, cancel).await {
        Ok(identity) => identity,
        Err(err) => return Outcome::failure(err),
    };

    let greeting = if identity.username.is_empty() {
        "Welcome to the forge, anonymous!".to_string()
    } else {
        format!("Welcome to the forge, @{}!", identity.username)
    };

    match write_line(streams.output.as_mut(), &greeting).await {
        Ok(()) => Outcome::success(),
        Err(err) => Outcome::failure(err),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
