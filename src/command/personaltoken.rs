//! Credential issuance: `personal-access-token <name> <scopes> [expires-at]`.
//!
//! Scopes are comma-separated; the optional expiry is a date string passed
//! to the authority verbatim.  The authority issues the token itself, so
//! this command never touches the backend store.

use tokio_util::sync::CancellationToken;

use crate::command::args::OperationRequest;
use crate::command::readwriter::ReadWriter;
use crate::command::{write_line, CommandContext, Outcome};
use crate::error::GateError;

pub const COMMAND: &str = "personal-access-token";

pub async fn execute(
    ctx: &CommandContext,
    op: &OperationRequest,
    streams: &mut ReadWriter,
    trace_id: &str,
    cancel: &CancellationToken,
) -> Outcome {
    if !(3..=4).contains(&op.args.len()) {
        return Outcome::failure(GateError::disallowed_command());
    }
    let name = &op.args[1];
    let scopes: Vec<String> = op.args[2]
        .split(',')
        .map(str::trim)
        .filter(|scope| !scope.is_empty())
        .map(ToOwned::to_owned)
        .collect();
    let expires_at = op.args.get(3).map(String::as_str);

    let credential = match ctx
        .tokens
        .issue(&ctx.principal, name, &scopes, expires_at, trace_id, cancel)
        .await
    {
        Ok(credential) => credential,
        Err(err) => return Outcome::failure(err),
    };

    let expiry = credential
        .expires_at
        .as_deref()
        .filter(|date| !date.is_empty())
        .unwrap_or("never");

    let report = [
        format!("Token:   {}", credential.token),
        format!("Scopes:  {}", credential.scopes.join(",")),
        format!("Expires: {expiry}"),
    ];
    for line in &report {
        if let Err(err) = write_line(streams.output.as_mut(), line).await {
            return Outcome::failure(err);
        }
    }

    Outcome::success()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
