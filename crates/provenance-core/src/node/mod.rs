//! Storage nodes: the bundler a caller funds and uploads to.
//!
//! A [`StorageNode`] handle is bound to one node URL, one currency and one
//! caller identity, mirroring how a bundler client is constructed.

pub mod http;
pub mod local;

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::currency::{Amount, Currency};
use crate::error::{Result, ToolkitError};
use crate::receipt::{TxReceipt, UploadReceipt};
use crate::tags::Tag;

pub use http::{ErrorBody, HttpNode};
pub use local::{LocalNode, LocalStore, Pricing};

/// Nodes offered by default.
pub const KNOWN_NODES: &[&str] = &[
    "https://node1.irys.xyz",
    "https://node2.irys.xyz",
    "https://devnet.irys.xyz",
];

/// Declared shape of a chunked upload, sent when the session is opened.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionManifest {
    pub total_size: u64,
    pub chunk_size: u64,
    pub total_chunks: u64,
    pub tags: Vec<Tag>,
}

impl SessionManifest {
    /// Length chunk `index` must have.
    pub fn expected_len(&self, index: u64) -> Option<u64> {
        if index >= self.total_chunks {
            return None;
        }
        let offset = index * self.chunk_size;
        Some(self.chunk_size.min(self.total_size.saturating_sub(offset)))
    }
}

#[async_trait]
pub trait StorageNode: Send + Sync {
    fn url(&self) -> &str;

    fn currency(&self) -> Currency;

    /// Address of the identity this handle acts for.
    fn address(&self) -> &str;

    /// Quote for storing `size_bytes` bytes.
    async fn price(&self, size_bytes: u64) -> Result<Amount>;

    async fn loaded_balance(&self) -> Result<Amount>;

    /// Move `amount` from the caller's wallet into the node's escrow.
    async fn fund(&self, amount: Amount) -> Result<TxReceipt>;

    /// Move `amount` of the loaded balance back to the caller's wallet.
    async fn withdraw(&self, amount: Amount) -> Result<TxReceipt>;

    /// Single-shot upload; charges the price against the loaded balance.
    async fn upload(&self, data: &[u8], tags: &[Tag]) -> Result<UploadReceipt>;

    async fn create_session(&self, manifest: &SessionManifest) -> Result<String>;

    /// Store chunk `index`; `hash` is its Blake3 hash as computed by the sender.
    async fn put_chunk(&self, session: &str, index: u64, data: &[u8], hash: &[u8; 32])
        -> Result<()>;

    /// Finalize once every chunk is stored; the node checks `data_root`.
    async fn finish_session(&self, session: &str, data_root: &[u8; 32]) -> Result<UploadReceipt>;

    /// Drop an unfinished session and the chunks it holds. Unknown ids are ignored.
    async fn abort_session(&self, session: &str) -> Result<()>;

    async fn receipt(&self, id: &str) -> Result<UploadReceipt>;
}

/// Where a node URL points.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeEndpoint {
    Http(String),
    /// On-disk node rooted at a directory, written `local:<dir>`.
    Local(PathBuf),
}

impl NodeEndpoint {
    pub fn parse(url: &str) -> Result<Self> {
        let url = url.trim();
        if let Some(dir) = url.strip_prefix("local:") {
            if dir.is_empty() {
                return Err(ToolkitError::validation("local node needs a directory"));
            }
            return Ok(NodeEndpoint::Local(PathBuf::from(dir)));
        }
        if url.starts_with("http://") || url.starts_with("https://") {
            return Ok(NodeEndpoint::Http(url.trim_end_matches('/').to_string()));
        }
        Err(ToolkitError::validation(format!(
            "unsupported node url `{url}` (expected http(s):// or local:<dir>)"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_chunk_is_short() {
        let manifest = SessionManifest {
            total_size: 10,
            chunk_size: 4,
            total_chunks: 3,
            tags: vec![],
        };
        assert_eq!(manifest.expected_len(0), Some(4));
        assert_eq!(manifest.expected_len(2), Some(2));
        assert_eq!(manifest.expected_len(3), None);
    }

    #[test]
    fn endpoints_parse() {
        assert_eq!(
            NodeEndpoint::parse("https://node1.irys.xyz/").unwrap(),
            NodeEndpoint::Http("https://node1.irys.xyz".into())
        );
        assert_eq!(
            NodeEndpoint::parse("local:/tmp/store").unwrap(),
            NodeEndpoint::Local(PathBuf::from("/tmp/store"))
        );
        assert!(NodeEndpoint::parse("ftp://x").is_err());
        assert!(NodeEndpoint::parse("local:").is_err());
    }
}
