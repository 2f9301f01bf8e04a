use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use super::network::{policy_digest, KeyCapsule, KeyNetwork};
use super::{DecodedBlob, EncryptedContainer, EncryptionProvider, FileInput, ProviderKind};
use crate::access::{AccessControlCondition, AccessPolicy, Comparator};
use crate::crypto::{ContentKey, Sealed};
use crate::error::{Result, ToolkitError};
use crate::unix_millis;
use crate::wallet::Wallet;

pub const LIT_README: &str =
    "This file was encrypted using LitProtocol and the Irys Provenance Toolkit.";

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReturnValueTest {
    comparator: Comparator,
    value: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LitCondition {
    #[serde(default)]
    contract_address: String,
    #[serde(default)]
    standard_contract_type: String,
    chain: String,
    method: String,
    parameters: Vec<String>,
    return_value_test: ReturnValueTest,
}

impl From<&AccessControlCondition> for LitCondition {
    fn from(c: &AccessControlCondition) -> Self {
        Self {
            contract_address: String::new(),
            standard_contract_type: String::new(),
            chain: c.chain.clone(),
            method: c.method.clone(),
            parameters: c.parameters.clone(),
            return_value_test: ReturnValueTest {
                comparator: c.comparator,
                value: c.value.clone(),
            },
        }
    }
}

impl From<LitCondition> for AccessControlCondition {
    fn from(c: LitCondition) -> Self {
        Self {
            chain: c.chain,
            method: c.method,
            parameters: c.parameters,
            comparator: c.return_value_test.comparator,
            value: c.return_value_test.value,
        }
    }
}

/// The zipped-with-metadata document.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LitEnvelope {
    readme: String,
    chain: String,
    network: String,
    access_control_conditions: Vec<LitCondition>,
    encrypted_symmetric_key: String,
    file_name: String,
    file_type: String,
    ciphertext: String,
}

pub struct LitProvider {
    chain: String,
    network: String,
    keys: Arc<dyn KeyNetwork>,
    wallet: Arc<Wallet>,
}

impl LitProvider {
    pub fn new(
        chain: impl Into<String>,
        network: impl Into<String>,
        keys: Arc<dyn KeyNetwork>,
        wallet: Arc<Wallet>,
    ) -> Self {
        Self {
            chain: chain.into(),
            network: network.into(),
            keys,
            wallet,
        }
    }

    pub fn chain(&self) -> &str {
        &self.chain
    }
}

fn decode_b64(field: &str, value: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(value)
        .map_err(|e| ToolkitError::Malformed(format!("lit envelope field {field}: {e}")))
}

#[async_trait]
impl EncryptionProvider for LitProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Lit
    }

    /// Anyone holding a non-negative ethereum balance, i.e. everyone.
    fn default_policy(&self) -> AccessPolicy {
        AccessPolicy::single(AccessControlCondition::balance_at_least("ethereum", 0))
    }

    async fn encrypt(&self, file: &FileInput, policy: &AccessPolicy) -> Result<EncryptedContainer> {
        let key = ContentKey::generate();
        let capsule = self.keys.escrow(policy, &key).await?;
        let sealed = key.seal(&file.bytes, &policy_digest(policy))?;

        let envelope = LitEnvelope {
            readme: LIT_README.to_string(),
            chain: self.chain.clone(),
            network: self.network.clone(),
            access_control_conditions: policy.conditions.iter().map(LitCondition::from).collect(),
            encrypted_symmetric_key: STANDARD.encode(capsule.to_bytes()),
            file_name: file.name.clone(),
            file_type: file.content_type.clone(),
            ciphertext: STANDARD.encode(sealed.to_bytes()),
        };
        let bytes = serde_json::to_vec(&envelope)?;
        tracing::debug!(file = %file.name, size = bytes.len(), network = %self.network, "lit envelope built");
        Ok(EncryptedContainer::new(bytes))
    }

    async fn decrypt(
        &self,
        container: &EncryptedContainer,
        content_type: &str,
    ) -> Result<DecodedBlob> {
        let envelope: LitEnvelope = serde_json::from_slice(container.as_bytes())
            .map_err(|e| ToolkitError::Malformed(format!("not a lit envelope: {e}")))?;
        let policy = AccessPolicy::new(
            envelope
                .access_control_conditions
                .into_iter()
                .map(AccessControlCondition::from)
                .collect(),
        )?;
        let capsule = KeyCapsule::from_bytes(&decode_b64(
            "encryptedSymmetricKey",
            &envelope.encrypted_symmetric_key,
        )?)?;
        let sealed = Sealed::from_bytes(&decode_b64("ciphertext", &envelope.ciphertext)?)?;

        let auth = self.wallet.auth_sig(&envelope.chain, unix_millis());
        let key = self.keys.release(&capsule, &policy, &auth).await?;
        let bytes = key.open(&sealed, &policy_digest(&policy))?;

        let content_type = if content_type.is_empty() {
            envelope.file_type
        } else {
            content_type.to_string()
        };
        Ok(DecodedBlob {
            bytes,
            content_type,
        })
    }
}
