//! Core of the provenance toolkit.
//!
//! The crate covers the full life of a provenance upload:
//!
//! * [`encryption`] seals a file under an access policy, with a Lit-style
//!   JSON envelope or a TACo-style binary message kit.
//! * [`uploader`] prices an upload, funds the node when the loaded balance
//!   does not cover it, and uploads either in one shot or in chunks.
//! * [`gateway`] fetches uploaded content back by id.
//! * [`pipeline`] strings these into encrypt → upload and fetch → decrypt
//!   flows whose state can be watched.
//!
//! Storage nodes, gateways and key networks are traits so that remote
//! services and the in-process [`node::LocalStore`] are interchangeable.

pub mod access;
pub mod actions;
pub mod config;
pub mod crypto;
pub mod currency;
pub mod encryption;
pub mod gateway;
pub mod ledger;
pub mod merkle;
pub mod node;
pub mod pipeline;
pub mod query;
pub mod receipt;
pub mod tags;
pub mod uploader;
pub mod wallet;

mod error;

pub use error::{Result, ToolkitError};

/// Milliseconds since the unix epoch.
pub fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
