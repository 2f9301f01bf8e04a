//! Client-side encryption under an access policy.
//!
//! Both providers seal the payload locally with a fresh [`ContentKey`] and
//! escrow that key with a [`KeyNetwork`] bound to the policy. They differ in
//! the container format and in how the policy is written into it:
//!
//! * [`LitProvider`] produces a JSON envelope carrying the conditions, the
//!   escrowed key and the ciphertext, all in one document.
//! * [`TacoProvider`] produces a compact binary message kit keyed to a
//!   ritual and domain, with numeric chain ids in its conditions.
//!
//! Callers pick a variant once through [`provider_for`].
//!
//! [`ContentKey`]: crate::crypto::ContentKey

mod lit;
mod network;
mod taco;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::access::AccessPolicy;
use crate::error::{Result, ToolkitError};
use crate::wallet::Wallet;

pub use lit::{LitProvider, LIT_README};
pub use network::{policy_digest, KeyCapsule, KeyNetwork, LocalKeyNetwork};
pub use taco::{chain_id, chain_name, TacoProvider, TACO_MAGIC};

/// A file picked for upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileInput {
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl FileInput {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }
}

/// Opaque provider output; only the producing variant can open it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedContainer(Vec<u8>);

impl EncryptedContainer {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Decrypted content ready for preview.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedBlob {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl DecodedBlob {
    /// `data:<type>;base64,<payload>`
    pub fn to_data_url(&self) -> String {
        let content_type = if self.content_type.is_empty() {
            crate::tags::OCTET_STREAM
        } else {
            &self.content_type
        };
        format!("data:{content_type};base64,{}", STANDARD.encode(&self.bytes))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Lit,
    Taco,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProviderKind::Lit => "lit",
            ProviderKind::Taco => "taco",
        })
    }
}

impl FromStr for ProviderKind {
    type Err = ToolkitError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lit" => Ok(ProviderKind::Lit),
            "taco" => Ok(ProviderKind::Taco),
            other => Err(ToolkitError::validation(format!(
                "unknown encryption provider `{other}` (expected lit or taco)"
            ))),
        }
    }
}

#[async_trait]
pub trait EncryptionProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Policy applied when the caller does not supply one.
    fn default_policy(&self) -> AccessPolicy;

    /// Seal `file` so that only identities satisfying `policy` can open it.
    async fn encrypt(&self, file: &FileInput, policy: &AccessPolicy) -> Result<EncryptedContainer>;

    /// Open `container` as the provider's identity. `content_type` is the
    /// original type recorded at upload; failures are always errors.
    async fn decrypt(&self, container: &EncryptedContainer, content_type: &str)
        -> Result<DecodedBlob>;
}

/// Settings the two variants draw from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub lit_chain: String,
    pub lit_network: String,
    pub taco_domain: String,
    pub taco_ritual_id: u32,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            lit_chain: "polygon".to_string(),
            lit_network: "cayenne".to_string(),
            taco_domain: "tapir".to_string(),
            taco_ritual_id: 0,
        }
    }
}

pub fn provider_for(
    kind: ProviderKind,
    settings: &ProviderSettings,
    network: Arc<dyn KeyNetwork>,
    wallet: Arc<Wallet>,
) -> Arc<dyn EncryptionProvider> {
    match kind {
        ProviderKind::Lit => Arc::new(LitProvider::new(
            settings.lit_chain.clone(),
            settings.lit_network.clone(),
            network,
            wallet,
        )),
        ProviderKind::Taco => Arc::new(TacoProvider::new(
            settings.taco_domain.clone(),
            settings.taco_ritual_id,
            network,
            wallet,
        )),
    }
}
