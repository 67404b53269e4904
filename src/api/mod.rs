//! Clients for the internal authority API.
//!
//! [`client::ApiClient`] carries the shared request/response mechanics and
//! error normalization; the per-purpose clients ([`token`], [`discover`],
//! [`accessverifier`]) define their own envelopes on top of it.

pub mod accessverifier;
pub mod client;
pub mod discover;
pub mod token;
