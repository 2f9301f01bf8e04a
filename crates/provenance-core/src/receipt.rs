use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::currency::Amount;
use crate::error::{Result, ToolkitError};
use crate::merkle::Hash;
use crate::tags::Tag;

pub const RECEIPT_VERSION: &str = "1.0.0";

/// Proof that a node accepted and persisted the full content of an upload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    /// Content address used for retrieval through a gateway.
    pub id: String,
    /// Unix milliseconds at which the node acknowledged the upload.
    pub timestamp: u64,
    pub version: String,
    pub size: u64,
    /// Hex Blake3 chunk root of the uploaded bytes.
    pub data_root: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl UploadReceipt {
    pub fn unsigned(id: String, timestamp: u64, size: u64, data_root: &Hash) -> Self {
        Self {
            id,
            timestamp,
            version: RECEIPT_VERSION.to_string(),
            size,
            data_root: hex::encode(data_root),
            public: None,
            signature: None,
        }
    }

    pub fn signing_digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(b"provenance-receipt-v1");
        hasher.update(self.id.as_bytes());
        hasher.update(self.timestamp.to_le_bytes());
        hasher.update(self.version.as_bytes());
        hasher.update(self.size.to_le_bytes());
        hasher.update(self.data_root.as_bytes());
        hasher.finalize().into()
    }

    pub fn sign(mut self, key: &SigningKey) -> Self {
        let signature = key.sign(&self.signing_digest());
        self.public = Some(hex::encode(key.verifying_key().as_bytes()));
        self.signature = Some(hex::encode(signature.to_bytes()));
        self
    }

    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    /// Check the node signature. Unsigned receipts fail verification.
    pub fn verify(&self) -> Result<()> {
        let bad = |why: &str| ToolkitError::Malformed(format!("receipt {}: {why}", self.id));
        let (public, signature) = match (&self.public, &self.signature) {
            (Some(p), Some(s)) => (p, s),
            _ => return Err(bad("receipt is not signed")),
        };
        let pk: [u8; 32] = hex::decode(public)
            .ok()
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| bad("bad public key"))?;
        let sig: [u8; 64] = hex::decode(signature)
            .ok()
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| bad("bad signature"))?;
        let key = VerifyingKey::from_bytes(&pk).map_err(|_| bad("bad public key"))?;
        key.verify(&self.signing_digest(), &Signature::from_bytes(&sig))
            .map_err(|_| bad("signature mismatch"))
    }
}

/// Derive the id a node assigns to an upload.
///
/// The sequence number keeps repeated uploads of identical bytes distinct.
pub fn content_id(owner: &str, data_root: &Hash, tags: &[Tag], sequence: u64) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"provenance-id-v1");
    hasher.update(owner.as_bytes());
    hasher.update(data_root);
    for tag in tags {
        hasher.update(&(tag.name.len() as u64).to_le_bytes());
        hasher.update(tag.name.as_bytes());
        hasher.update(&(tag.value.len() as u64).to_le_bytes());
        hasher.update(tag.value.as_bytes());
    }
    hasher.update(&sequence.to_le_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize().as_bytes())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxKind {
    Fund,
    Withdraw,
}

/// Result of a balance-moving transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_id: String,
    pub kind: TxKind,
    pub currency: String,
    pub amount: Amount,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn signed_receipt_verifies_and_detects_tampering() {
        let key = SigningKey::generate(&mut OsRng);
        let receipt = UploadReceipt::unsigned("abc".into(), 1, 10, &[7u8; 32]).sign(&key);
        receipt.verify().expect("valid");

        let mut tampered = receipt.clone();
        tampered.size = 11;
        assert!(tampered.verify().is_err());

        let unsigned = UploadReceipt::unsigned("abc".into(), 1, 10, &[7u8; 32]);
        assert!(!unsigned.is_signed());
        assert!(unsigned.verify().is_err());
    }

    #[test]
    fn ids_are_url_safe_and_sequence_dependent() {
        let tags = vec![Tag::new("Content-Type", "text/plain")];
        let a = content_id("0x1", &[1u8; 32], &tags, 0);
        let b = content_id("0x1", &[1u8; 32], &tags, 1);
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
