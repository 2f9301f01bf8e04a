//! Caller identity: an ed25519 key, the address derived from it, and the
//! signed auth message presented to a key network when asking for a key.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Result, ToolkitError};

/// Placeholder substituted with the requester's address in conditions.
pub const USER_ADDRESS: &str = ":userAddress";

pub struct Wallet {
    key: SigningKey,
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &self.address())
            .finish()
    }
}

impl Wallet {
    pub fn generate() -> Self {
        Self {
            key: SigningKey::generate(&mut OsRng),
        }
    }

    /// 32-byte secret as 64 hex characters.
    pub fn from_secret_hex(secret: &str) -> Result<Self> {
        let bytes = hex::decode(secret.trim())
            .map_err(|e| ToolkitError::validation(format!("invalid secret key hex: {e}")))?;
        let raw: [u8; 32] = bytes
            .try_into()
            .map_err(|_| ToolkitError::validation("secret key must be 32 bytes (64 hex chars)"))?;
        Ok(Self {
            key: SigningKey::from_bytes(&raw),
        })
    }

    pub fn secret_hex(&self) -> String {
        hex::encode(self.key.to_bytes())
    }

    pub fn public_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }

    pub fn address(&self) -> String {
        address_of(&self.public_key())
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        self.key.sign(message)
    }

    /// Sign a fresh auth message for `chain`.
    pub fn auth_sig(&self, chain: &str, issued_at_ms: u64) -> AuthSig {
        let address = self.address();
        let message = format!(
            "Provenance Toolkit wants you to sign in with your account:\n{address}\n\nChain: {chain}\nIssued At: {issued_at_ms}"
        );
        let signature = self.sign(message.as_bytes());
        AuthSig {
            address,
            message,
            signature: hex::encode(signature.to_bytes()),
            public_key: hex::encode(self.public_key().as_bytes()),
        }
    }
}

/// `0x` + last 20 bytes of `sha256(public key)`.
pub fn address_of(key: &VerifyingKey) -> String {
    let digest = Sha256::digest(key.as_bytes());
    format!("0x{}", hex::encode(&digest[12..]))
}

/// Proof that the requester controls `address`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSig {
    pub address: String,
    pub message: String,
    pub signature: String,
    pub public_key: String,
}

impl AuthSig {
    /// Verify the signature and that the key maps to the claimed address.
    pub fn verify(&self) -> Result<()> {
        let deny = |why: &str| ToolkitError::Decryption(format!("invalid auth signature: {why}"));
        let pk_bytes: [u8; 32] = hex::decode(&self.public_key)
            .ok()
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| deny("bad public key"))?;
        let key = VerifyingKey::from_bytes(&pk_bytes).map_err(|_| deny("bad public key"))?;
        if address_of(&key) != self.address {
            return Err(deny("address does not match key"));
        }
        let sig_bytes: [u8; 64] = hex::decode(&self.signature)
            .ok()
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| deny("bad signature encoding"))?;
        key.verify(self.message.as_bytes(), &Signature::from_bytes(&sig_bytes))
            .map_err(|_| deny("signature mismatch"))
    }
}
