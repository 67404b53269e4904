//! The closed error taxonomy surfaced by the gateway core.
//!
//! Every error is terminal for the current operation: nothing in the core
//! retries, and no kind is converted into another on the way up.  Callers
//! match on the kind to distinguish "the authority said no" from "we could
//! not reach it" from "we gave up".

use thiserror::Error;

/// Fixed denial text for operations rejected before any network call.
pub const DISALLOWED_COMMAND: &str = "Disallowed command";

/// Error kinds produced by the gateway core.
#[derive(Debug, Error)]
pub enum GateError {
    /// Argument validation failed, or the authority denied access.
    /// The carried message is shown to the caller verbatim.
    #[error("{0}")]
    Disallowed(String),

    /// The authority reported a failure with an explicit message, either as
    /// `success: false` in the envelope or as a message body on a non-2xx
    /// status.  The message is carried verbatim.
    #[error("{0}")]
    Authority(String),

    /// A success-status response body was not valid JSON.  The text is
    /// intentionally fixed; raw body content is never surfaced.
    #[error("Parsing failed")]
    ParseFailure,

    /// A non-2xx response carried no usable message; only the status code
    /// identifies the failure.
    #[error("Internal API error ({0})")]
    BareStatus(u16),

    /// Network-level failure reaching the authority or the backend store.
    #[error("connection failed: {0}")]
    Transport(String),

    /// The governing cancellation token fired mid-call.
    #[error("operation cancelled")]
    Cancelled,
}

impl GateError {
    /// The fixed error for operations rejected by shape/arity validation.
    pub fn disallowed_command() -> Self {
        GateError::Disallowed(DISALLOWED_COMMAND.to_string())
    }

    /// True for cancellation, false for every substantive failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, GateError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_texts_are_exact() {
        assert_eq!(
            GateError::disallowed_command().to_string(),
            "Disallowed command"
        );
        assert_eq!(
            GateError::Authority("missing user".to_string()).to_string(),
            "missing user"
        );
        assert_eq!(GateError::ParseFailure.to_string(), "Parsing failed");
        assert_eq!(
            GateError::BareStatus(403).to_string(),
            "Internal API error (403)"
        );
        assert_eq!(GateError::Cancelled.to_string(), "operation cancelled");
    }

    #[test]
    fn cancellation_is_distinguishable() {
        assert!(GateError::Cancelled.is_cancelled());
        assert!(!GateError::ParseFailure.is_cancelled());
        assert!(!GateError::Disallowed(String::new()).is_cancelled());
    }
}
