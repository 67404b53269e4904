//! Credential issuance against the authority's token endpoint.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::api::client::ApiClient;
use crate::api::discover::DiscoverClient;
use crate::command::args::{Principal, PrincipalEnvelope};
use crate::error::GateError;

const TOKEN_PATH: &str = "/api/v4/internal/personal_access_token";

// ---------------------------------------------------------------------------
// Envelopes
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct IssueRequest<'a> {
    #[serde(flatten)]
    principal: PrincipalEnvelope,
    name: &'a str,
    scopes: &'a [String],
    /// `None` means "no expiry" and is serialized as an explicit `null`;
    /// the authority distinguishes a null expiry from an omitted field.
    expires_at: Option<&'a str>,
}

/// A token issued by the authority.  The granted scope list may differ from
/// the requested one, and the expiry is an opaque date string passed through
/// verbatim; the authority is authoritative for both.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IssuedCredential {
    pub token: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub expires_at: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct TokenClient {
    api: Arc<ApiClient>,
    discover: DiscoverClient,
}

impl TokenClient {
    pub fn new(api: Arc<ApiClient>) -> Self {
        let discover = DiscoverClient::new(Arc::clone(&api));
        Self { api, discover }
    }

    /// Request a new access token for `principal`.
    ///
    /// Key-id and user-id principals are sent directly; a username principal
    /// is first resolved to a user id through the discovery endpoint, since
    /// the token endpoint does not accept usernames.
    pub async fn issue(
        &self,
        principal: &Principal,
        name: &str,
        scopes: &[String],
        expires_at: Option<&str>,
        trace_id: &str,
        cancel: &CancellationToken,
    ) -> Result<IssuedCredential, GateError> {
        let principal_fields = match principal {
            Principal::Username(_) => {
                let identity = self.discover.discover(principal, trace_id, cancel).await?;
                PrincipalEnvelope::from_user_id(identity.user_id)
            }
            other => PrincipalEnvelope::from(other),
        };

        let request = IssueRequest {
            principal: principal_fields,
            name,
            scopes,
            expires_at,
        };

        self.api.post(TOKEN_PATH, &request, trace_id, cancel).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
