//! Authenticated JSON-over-HTTP client for the internal authority API.
//!
//! Every privileged decision in the gateway goes through this client.  The
//! authority's response shapes are deliberately irregular (a `success`
//! flag, an embedded error message, a bare HTTP status, or a malformed
//! body), and [`decode_response`] normalizes all of them into the closed
//! [`GateError`] taxonomy so callers reason about exactly one error shape.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::GateError;

/// Header carrying the per-operation trace identifier.
pub const CORRELATION_HEADER: &str = "X-Correlation-ID";

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct ApiClient {
    base_url: String,
    secret: String,
    http: reqwest::Client,
}

impl ApiClient {
    /// Build a client for the authority at `base_url`, authenticating every
    /// request with the shared `secret`.
    pub fn new(
        base_url: impl Into<String>,
        secret: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("gitgate/", env!("CARGO_PKG_VERSION")))
            .timeout(request_timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            base_url: base_url.into(),
            secret: secret.into(),
            http,
        })
    }

    /// GET `path` with the given query parameters and decode the response
    /// envelope into `T`.
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        trace_id: &str,
        cancel: &CancellationToken,
    ) -> Result<T, GateError> {
        let request = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .query(query);
        self.dispatch(path, request, trace_id, cancel).await
    }

    /// POST `body` as JSON to `path` and decode the response envelope into `T`.
    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
        trace_id: &str,
        cancel: &CancellationToken,
    ) -> Result<T, GateError> {
        let request = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .json(body);
        self.dispatch(path, request, trace_id, cancel).await
    }

    async fn dispatch<T: DeserializeOwned>(
        &self,
        path: &str,
        request: reqwest::RequestBuilder,
        trace_id: &str,
        cancel: &CancellationToken,
    ) -> Result<T, GateError> {
        let request = request
            .header("Authorization", format!("Bearer {}", self.secret))
            .header(CORRELATION_HEADER, trace_id)
            .header("Accept", "application/json");

        let call = async {
            let response = request.send().await.map_err(transport_error)?;
            let status = response.status();
            let body = response.bytes().await.map_err(transport_error)?;
            debug!(%path, %status, body_bytes = body.len(), "authority response");
            decode_response(status, &body)
        };

        tokio::select! {
            () = cancel.cancelled() => Err(GateError::Cancelled),
            result = call => result,
        }
    }
}

fn transport_error(err: reqwest::Error) -> GateError {
    // reqwest error displays never include response bodies, so this is safe
    // to surface to the caller.
    GateError::Transport(err.to_string())
}

// ---------------------------------------------------------------------------
// Response normalization
// ---------------------------------------------------------------------------

/// Lenient probe of the response envelope.  Both fields are optional so the
/// probe succeeds on any JSON object, whatever the operation-specific
/// payload looks like.
#[derive(Debug, Deserialize)]
struct EnvelopeProbe {
    success: Option<bool>,
    message: Option<String>,
}

/// Normalize one authority response into either a decoded payload or a
/// [`GateError`].
///
/// The body is decoded optimistically first, then the branch is chosen on
/// decode success, status class, and message presence.  Precedence: an
/// explicit `success: false` or message in the body always wins over the
/// bare status code; a parse failure on a success status is reported as a
/// parsing error, never swallowed.
pub(crate) fn decode_response<T: DeserializeOwned>(
    status: StatusCode,
    body: &[u8],
) -> Result<T, GateError> {
    let probe: Option<EnvelopeProbe> = serde_json::from_slice(body).ok();
    let status_ok = (200..400).contains(&status.as_u16());

    match (status_ok, probe) {
        // The authority reported the failure itself; its message is
        // authoritative regardless of status.
        (_, Some(probe)) if probe.success == Some(false) => {
            Err(GateError::Authority(probe.message.unwrap_or_default()))
        }
        (true, Some(_)) => serde_json::from_slice(body).map_err(|_| GateError::ParseFailure),
        (true, None) => Err(GateError::ParseFailure),
        (false, Some(probe)) => match probe.message {
            Some(message) if !message.is_empty() => Err(GateError::Authority(message)),
            _ => Err(GateError::BareStatus(status.as_u16())),
        },
        (false, None) => Err(GateError::BareStatus(status.as_u16())),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
