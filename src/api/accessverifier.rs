//! Access verification: ask the authority whether a principal may perform an
//! operation on a repository.
//!
//! This module only decides permission and resolves backend routing; it
//! never talks to the backend store itself.  Execution is always the command
//! pipeline's job.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::client::ApiClient;
use crate::command::args::{Principal, PrincipalEnvelope};
use crate::error::GateError;

const ALLOWED_PATH: &str = "/api/v4/internal/allowed";

// ---------------------------------------------------------------------------
// Envelopes
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct VerifyRequest<'a> {
    #[serde(flatten)]
    principal: PrincipalEnvelope,
    action: &'a str,
    project: &'a str,
    protocol: &'static str,
}

/// The authority's affirmative answer to an access check: routing
/// information for the backend store plus the audit fields.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Approval {
    /// Resolved username of the principal.
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub project_id: u64,
    #[serde(default)]
    pub root_namespace_id: u64,
    /// Canonical project path, e.g. `group/project-path`.
    #[serde(default)]
    pub project_path: String,
    pub backend: BackendRoute,
}

/// Where the backend transport should connect to perform the operation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BackendRoute {
    /// Store address, `tcp://host:port` or `unix:///path`.
    pub address: String,
    /// Per-call authorization token for the store, when the store requires one.
    #[serde(default)]
    pub token: Option<String>,
    /// Repository path relative to the store's root.
    pub relative_path: String,
}

// ---------------------------------------------------------------------------
// Verifier
// ---------------------------------------------------------------------------

pub struct AccessVerifier {
    api: Arc<ApiClient>,
}

impl AccessVerifier {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }

    /// Ask the authority whether `principal` may perform `action` on the
    /// repository at `repo`.
    ///
    /// A denial (the authority answering rather than failing) surfaces as
    /// [`GateError::Disallowed`] with the authority's message verbatim, so
    /// the pipeline treats it as terminal.  Every other error kind passes
    /// through unchanged.
    pub async fn verify(
        &self,
        principal: &Principal,
        action: &str,
        repo: &str,
        trace_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Approval, GateError> {
        let request = VerifyRequest {
            principal: PrincipalEnvelope::from(principal),
            action,
            project: repo,
            protocol: "ssh",
        };

        match self
            .api
            .post::<Approval, _>(ALLOWED_PATH, &request, trace_id, cancel)
            .await
        {
            Ok(approval) => {
                debug!(
                    action,
                    repo,
                    username = %approval.username,
                    backend = %approval.backend.address,
                    "access approved"
                );
                Ok(approval)
            }
            Err(GateError::Authority(message)) => Err(GateError::Disallowed(message)),
            Err(err) => Err(err),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use mockito::Matcher;

    fn verifier_for(server: &mockito::ServerGuard) -> AccessVerifier {
        let api = ApiClient::new(server.url(), "test-secret", Duration::from_secs(5)).unwrap();
        AccessVerifier::new(Arc::new(api))
    }

    fn approval_body() -> &'static str {
        r#"{
            "success": true,
            "username": "alex-doe",
            "project_id": 42,
            "root_namespace_id": 7,
            "project_path": "group/project-path",
            "backend": {
                "address": "unix:///var/run/store.sock",
                "token": "store-token",
                "relative_path": "group/project.git"
            }
        }"#
    }

    #[tokio::test]
    async fn approval_carries_routing_and_audit_fields() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v4/internal/allowed")
            .match_body(Matcher::Json(serde_json::json!({
                "key_id": "1",
                "action": "git-upload-archive",
                "project": "group/project.git",
                "protocol": "ssh",
            })))
            .with_body(approval_body())
            .create_async()
            .await;

        let verifier = verifier_for(&server);
        let cancel = CancellationToken::new();
        let approval = verifier
            .verify(
                &Principal::KeyId("1".to_string()),
                "git-upload-archive",
                "group/project.git",
                "trace",
                &cancel,
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(approval.username, "alex-doe");
        assert_eq!(approval.project_id, 42);
        assert_eq!(approval.root_namespace_id, 7);
        assert_eq!(approval.project_path, "group/project-path");
        assert_eq!(approval.backend.address, "unix:///var/run/store.sock");
        assert_eq!(approval.backend.token.as_deref(), Some("store-token"));
        assert_eq!(approval.backend.relative_path, "group/project.git");
    }

    #[tokio::test]
    async fn denial_is_disallowed_with_the_authority_message() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/v4/internal/allowed")
            .with_body(r#"{"success": false, "message": "Disallowed by API call"}"#)
            .create_async()
            .await;

        let verifier = verifier_for(&server);
        let cancel = CancellationToken::new();
        let err = verifier
            .verify(
                &Principal::KeyId("disallowed".to_string()),
                "git-upload-archive",
                "group/repo",
                "trace",
                &cancel,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, GateError::Disallowed(_)));
        assert_eq!(err.to_string(), "Disallowed by API call");
    }

    #[tokio::test]
    async fn non_denial_errors_pass_through_unchanged() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/v4/internal/allowed")
            .with_status(502)
            .with_body("")
            .create_async()
            .await;

        let verifier = verifier_for(&server);
        let cancel = CancellationToken::new();
        let err = verifier
            .verify(
                &Principal::UserId(3),
                "git-upload-archive",
                "group/repo",
                "trace",
                &cancel,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, GateError::BareStatus(502)));
    }
}
