//! Binary message kits.
//!
//! Layout, integers big-endian:
//!
//! ```text
//! "TMKv1" | ritual_id u32 | domain_len u16 | domain | conditions_len u32 |
//! conditions (JSON) | capsule_len u32 | capsule | sealed payload
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::network::{policy_digest, KeyCapsule, KeyNetwork};
use super::{DecodedBlob, EncryptedContainer, EncryptionProvider, FileInput, ProviderKind};
use crate::access::{AccessControlCondition, AccessPolicy, Comparator};
use crate::crypto::{ContentKey, Sealed};
use crate::error::{Result, ToolkitError};
use crate::tags;
use crate::unix_millis;
use crate::wallet::Wallet;

pub const TACO_MAGIC: &[u8; 5] = b"TMKv1";

const CHAIN_IDS: &[(&str, u64)] = &[
    ("ethereum", 1),
    ("sepolia", 11_155_111),
    ("polygon", 137),
    ("mumbai", 80_001),
    ("amoy", 80_002),
];

pub fn chain_id(name: &str) -> Option<u64> {
    CHAIN_IDS
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, id)| *id)
}

pub fn chain_name(id: u64) -> Option<&'static str> {
    CHAIN_IDS.iter().find(|(_, i)| *i == id).map(|(n, _)| *n)
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReturnValueTest {
    comparator: Comparator,
    value: u128,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcCondition {
    condition_type: String,
    chain: u64,
    method: String,
    parameters: Vec<String>,
    return_value_test: RpcReturnValueTest,
}

impl RpcCondition {
    fn from_condition(c: &AccessControlCondition) -> Result<Self> {
        let chain = chain_id(&c.chain).ok_or_else(|| {
            ToolkitError::validation(format!("chain `{}` has no known chain id", c.chain))
        })?;
        let value = c.value.trim().parse().map_err(|_| {
            ToolkitError::validation(format!("condition value `{}` is not an integer", c.value))
        })?;
        Ok(Self {
            condition_type: "rpc".to_string(),
            chain,
            method: c.method.clone(),
            parameters: c.parameters.clone(),
            return_value_test: RpcReturnValueTest {
                comparator: c.comparator,
                value,
            },
        })
    }

    fn to_condition(&self) -> Result<AccessControlCondition> {
        let chain = chain_name(self.chain)
            .ok_or_else(|| ToolkitError::Malformed(format!("unknown chain id {}", self.chain)))?;
        Ok(AccessControlCondition {
            chain: chain.to_string(),
            method: self.method.clone(),
            parameters: self.parameters.clone(),
            comparator: self.return_value_test.comparator,
            value: self.return_value_test.value.to_string(),
        })
    }
}

struct MessageKit {
    ritual_id: u32,
    domain: String,
    conditions: Vec<RpcCondition>,
    capsule: Vec<u8>,
    sealed: Vec<u8>,
}

impl MessageKit {
    fn to_bytes(&self) -> Result<Vec<u8>> {
        let conditions = serde_json::to_vec(&self.conditions)?;
        let domain_len = u16::try_from(self.domain.len())
            .map_err(|_| ToolkitError::validation("taco domain name too long"))?;
        let mut out = Vec::with_capacity(
            TACO_MAGIC.len() + 14 + self.domain.len() + conditions.len() + self.capsule.len() + self.sealed.len(),
        );
        out.extend_from_slice(TACO_MAGIC);
        out.extend_from_slice(&self.ritual_id.to_be_bytes());
        out.extend_from_slice(&domain_len.to_be_bytes());
        out.extend_from_slice(self.domain.as_bytes());
        out.extend_from_slice(&(conditions.len() as u32).to_be_bytes());
        out.extend_from_slice(&conditions);
        out.extend_from_slice(&(self.capsule.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.capsule);
        out.extend_from_slice(&self.sealed);
        Ok(out)
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut cursor = Cursor { bytes, pos: 0 };
        if cursor.take(TACO_MAGIC.len())? != TACO_MAGIC {
            return Err(ToolkitError::Malformed("not a taco message kit".into()));
        }
        let ritual_id = u32::from_be_bytes(cursor.array()?);
        let domain_len = u16::from_be_bytes(cursor.array()?) as usize;
        let domain = String::from_utf8(cursor.take(domain_len)?.to_vec())
            .map_err(|_| ToolkitError::Malformed("taco domain is not utf-8".into()))?;
        let conditions_len = u32::from_be_bytes(cursor.array()?) as usize;
        let conditions = serde_json::from_slice(cursor.take(conditions_len)?)?;
        let capsule_len = u32::from_be_bytes(cursor.array()?) as usize;
        let capsule = cursor.take(capsule_len)?.to_vec();
        let sealed = cursor.rest().to_vec();
        Ok(Self {
            ritual_id,
            domain,
            conditions,
            capsule,
            sealed,
        })
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| ToolkitError::Malformed("truncated taco message kit".into()))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn rest(&mut self) -> &'a [u8] {
        let slice = &self.bytes[self.pos..];
        self.pos = self.bytes.len();
        slice
    }
}

pub struct TacoProvider {
    domain: String,
    ritual_id: u32,
    keys: Arc<dyn KeyNetwork>,
    wallet: Arc<Wallet>,
}

impl TacoProvider {
    pub fn new(
        domain: impl Into<String>,
        ritual_id: u32,
        keys: Arc<dyn KeyNetwork>,
        wallet: Arc<Wallet>,
    ) -> Self {
        Self {
            domain: domain.into(),
            ritual_id,
            keys,
            wallet,
        }
    }
}

#[async_trait]
impl EncryptionProvider for TacoProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Taco
    }

    /// Requesters must hold a positive balance on Mumbai.
    fn default_policy(&self) -> AccessPolicy {
        AccessPolicy::single(AccessControlCondition {
            parameters: vec![crate::wallet::USER_ADDRESS.to_string()],
            ..AccessControlCondition::positive_balance("mumbai")
        })
    }

    async fn encrypt(&self, file: &FileInput, policy: &AccessPolicy) -> Result<EncryptedContainer> {
        let conditions = policy
            .conditions
            .iter()
            .map(RpcCondition::from_condition)
            .collect::<Result<Vec<_>>>()?;
        // bind to the policy exactly as it will be read back from the kit
        let policy = AccessPolicy::new(
            conditions
                .iter()
                .map(RpcCondition::to_condition)
                .collect::<Result<Vec<_>>>()?,
        )?;
        let key = ContentKey::generate();
        let capsule = self.keys.escrow(&policy, &key).await?;
        let sealed = key.seal(&file.bytes, &policy_digest(&policy))?;
        let kit = MessageKit {
            ritual_id: self.ritual_id,
            domain: self.domain.clone(),
            conditions,
            capsule: capsule.to_bytes(),
            sealed: sealed.to_bytes(),
        };
        let bytes = kit.to_bytes()?;
        tracing::debug!(
            file = %file.name,
            ritual = self.ritual_id,
            domain = %self.domain,
            size = bytes.len(),
            "taco message kit built"
        );
        Ok(EncryptedContainer::new(bytes))
    }

    async fn decrypt(
        &self,
        container: &EncryptedContainer,
        content_type: &str,
    ) -> Result<DecodedBlob> {
        let kit = MessageKit::from_bytes(container.as_bytes())?;
        if kit.domain != self.domain {
            tracing::warn!(kit = %kit.domain, configured = %self.domain, "message kit from another domain");
        }
        let conditions = kit
            .conditions
            .iter()
            .map(RpcCondition::to_condition)
            .collect::<Result<Vec<_>>>()?;
        let policy = AccessPolicy::new(conditions)?;
        let capsule = KeyCapsule::from_bytes(&kit.capsule)?;
        let sealed = Sealed::from_bytes(&kit.sealed)?;

        let auth = self
            .wallet
            .auth_sig(&policy.conditions[0].chain, unix_millis());
        let key = self.keys.release(&capsule, &policy, &auth).await?;
        let bytes = key.open(&sealed, &policy_digest(&policy))?;
        // Kits do not record the original type.
        let content_type = if content_type.is_empty() {
            tags::OCTET_STREAM
        } else {
            content_type
        };
        Ok(DecodedBlob {
            bytes,
            content_type: content_type.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::StaticChainState;
    use crate::encryption::LocalKeyNetwork;

    #[test]
    fn chain_ids_map_both_ways() {
        assert_eq!(chain_id("mumbai"), Some(80_001));
        assert_eq!(chain_id("Polygon"), Some(137));
        assert_eq!(chain_name(11_155_111), Some("sepolia"));
        assert_eq!(chain_id("solana"), None);
    }

    #[tokio::test]
    async fn kit_layout_and_positive_balance_gate() {
        let chain = Arc::new(StaticChainState::new());
        let keys = Arc::new(LocalKeyNetwork::new(2, 2, chain.clone()).unwrap());
        let wallet = Arc::new(Wallet::generate());
        let taco = TacoProvider::new("tapir", 7, keys, wallet.clone());

        let file = FileInput::new("pic.png", "image/png", vec![1, 2, 3, 4]);
        let container = taco.encrypt(&file, &taco.default_policy()).await.unwrap();
        let bytes = container.as_bytes();
        assert_eq!(&bytes[..5], TACO_MAGIC);
        assert_eq!(u32::from_be_bytes(bytes[5..9].try_into().unwrap()), 7);

        let kit = MessageKit::from_bytes(bytes).unwrap();
        assert_eq!(kit.domain, "tapir");
        assert_eq!(kit.conditions[0].chain, 80_001);
        assert_eq!(kit.conditions[0].condition_type, "rpc");

        let err = taco.decrypt(&container, "image/png").await.unwrap_err();
        assert!(matches!(err, ToolkitError::Decryption(_)));

        chain.set_balance("mumbai", &wallet.address(), 1);
        let blob = taco.decrypt(&container, "image/png").await.unwrap();
        assert_eq!(blob.bytes, vec![1, 2, 3, 4]);
        assert_eq!(blob.content_type, "image/png");
    }

    #[tokio::test]
    async fn missing_content_type_falls_back_to_octet_stream() {
        let chain = Arc::new(StaticChainState::new());
        let keys = Arc::new(LocalKeyNetwork::new(2, 2, chain.clone()).unwrap());
        let wallet = Arc::new(Wallet::generate());
        chain.set_balance("mumbai", &wallet.address(), 1);
        let taco = TacoProvider::new("tapir", 7, keys, wallet);

        let file = FileInput::new("notes", "text/markdown", b"# hi".to_vec());
        let container = taco.encrypt(&file, &taco.default_policy()).await.unwrap();
        let blob = taco.decrypt(&container, "").await.unwrap();
        assert_eq!(blob.bytes, b"# hi");
        assert_eq!(blob.content_type, tags::OCTET_STREAM);
    }

    #[tokio::test]
    async fn unknown_chains_cannot_be_encoded() {
        let chain = Arc::new(StaticChainState::new());
        let keys = Arc::new(LocalKeyNetwork::new(1, 1, chain).unwrap());
        let taco = TacoProvider::new("tapir", 0, keys, Arc::new(Wallet::generate()));
        let policy = AccessPolicy::single(AccessControlCondition::positive_balance("solana"));
        let file = FileInput::new("a", "text/plain", vec![]);
        assert!(taco.encrypt(&file, &policy).await.is_err());
    }

    #[test]
    fn truncated_kits_are_malformed() {
        assert!(MessageKit::from_bytes(b"TMKv1\0\0").is_err());
        assert!(MessageKit::from_bytes(b"ZIPv1\0\0\0\0\0\0").is_err());
    }
}
