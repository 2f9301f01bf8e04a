use thiserror::Error;

use crate::currency::Amount;

/// Canonical error type exposed by the toolkit.
#[derive(Debug, Error)]
pub enum ToolkitError {
    /// Caller-correctable input problem (missing selection, zero amount, ...).
    #[error("{0}")]
    Validation(String),

    /// The wallet cannot cover the requested funding transfer.
    #[error("insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds { requested: Amount, available: Amount },

    /// A withdrawal exceeds the loaded balance held at the node.
    #[error("insufficient loaded balance: requested {requested}, loaded {loaded}")]
    InsufficientBalance { requested: Amount, loaded: Amount },

    /// Transport failure or unreachable remote service.
    #[error("network error: {0}")]
    Network(String),

    /// The content id is unknown to the gateway or node.
    #[error("not found: {0}")]
    NotFound(String),

    /// Sealing or key escrow failed.
    #[error("encryption failure: {0}")]
    Encryption(String),

    /// The container could not be opened for this requester.
    #[error("decryption failure: {0}")]
    Decryption(String),

    /// The node rejected or did not acknowledge an upload.
    #[error("upload failure: {0}")]
    Upload(String),

    /// Malformed envelope, proof or wire payload.
    #[error("malformed data: {0}")]
    Malformed(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias used across the crate.
pub type Result<T, E = ToolkitError> = std::result::Result<T, E>;

impl ToolkitError {
    /// Only transport problems are worth retrying, and only by the caller.
    pub fn is_transient(&self) -> bool {
        matches!(self, ToolkitError::Network(_))
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        ToolkitError::Validation(msg.into())
    }
}

impl From<reqwest::Error> for ToolkitError {
    fn from(err: reqwest::Error) -> Self {
        ToolkitError::Network(err.to_string())
    }
}
