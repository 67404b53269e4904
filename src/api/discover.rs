//! Identity discovery: resolve a principal reference to a concrete user.

use std::sync::Arc;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::api::client::ApiClient;
use crate::command::args::Principal;
use crate::error::GateError;

const DISCOVER_PATH: &str = "/api/v4/internal/discover";

/// The authority's view of who a principal is.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Identity {
    #[serde(default)]
    pub user_id: u64,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub name: String,
}

pub struct DiscoverClient {
    api: Arc<ApiClient>,
}

impl DiscoverClient {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }

    /// Resolve `principal` via the authority's discovery endpoint.  The
    /// principal is sent as a single query parameter matching its variant.
    pub async fn discover(
        &self,
        principal: &Principal,
        trace_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Identity, GateError> {
        let (key, value) = principal.query_param();
        self.api
            .get(DISCOVER_PATH, &[(key, value)], trace_id, cancel)
            .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
