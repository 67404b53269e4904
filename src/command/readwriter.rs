//! The byte streams of one inbound session.
//!
//! Commands never own the real stdio directly; they receive a [`ReadWriter`]
//! so tests can substitute in-memory streams.

use tokio::io::{AsyncRead, AsyncWrite};

/// Input/output/error streams for one operation.
pub struct ReadWriter {
    pub input: Box<dyn AsyncRead + Send + Unpin>,
    pub output: Box<dyn AsyncWrite + Send + Unpin>,
    pub err_output: Box<dyn AsyncWrite + Send + Unpin>,
}

impl ReadWriter {
    /// Wire the session to the process stdio.
    pub fn stdio() -> Self {
        Self {
            input: Box::new(tokio::io::stdin()),
            output: Box::new(tokio::io::stdout()),
            err_output: Box::new(tokio::io::stderr()),
        }
    }
}

// ---------------------------------------------------------------------------
// Test support
// ---------------------------------------------------------------------------
