//! Threshold key network holding content keys behind access policies.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::access::{AccessPolicy, ChainReader};
use crate::crypto::{ContentKey, Sealed};
use crate::error::{Result, ToolkitError};
use crate::wallet::AuthSig;

/// A content key escrowed under one policy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyCapsule {
    sealed: Sealed,
}

impl KeyCapsule {
    pub fn to_bytes(&self) -> Vec<u8> {
        self.sealed.to_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            sealed: Sealed::from_bytes(bytes)?,
        })
    }
}

/// Stable digest of a policy; capsules and payloads are bound to it.
pub fn policy_digest(policy: &AccessPolicy) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"provenance-policy-v1");
    for c in &policy.conditions {
        for field in [&c.chain, &c.method, &c.value] {
            hasher.update((field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }
        hasher.update((c.parameters.len() as u64).to_le_bytes());
        for p in &c.parameters {
            hasher.update((p.len() as u64).to_le_bytes());
            hasher.update(p.as_bytes());
        }
        hasher.update(c.comparator.as_str().as_bytes());
    }
    hasher.finalize().into()
}

#[async_trait]
pub trait KeyNetwork: Send + Sync {
    /// Escrow `key` so that it is only released to requesters satisfying `policy`.
    async fn escrow(&self, policy: &AccessPolicy, key: &ContentKey) -> Result<KeyCapsule>;

    /// Release the key in `capsule` to the holder of `auth`.
    async fn release(
        &self,
        capsule: &KeyCapsule,
        policy: &AccessPolicy,
        auth: &AuthSig,
    ) -> Result<ContentKey>;
}

/// In-process network of `nodes` key holders needing `threshold` to answer.
pub struct LocalKeyNetwork {
    master: ContentKey,
    nodes: usize,
    threshold: usize,
    offline: AtomicUsize,
    chain: Arc<dyn ChainReader>,
}

impl LocalKeyNetwork {
    pub fn new(nodes: usize, threshold: usize, chain: Arc<dyn ChainReader>) -> Result<Self> {
        Self::with_master_key(ContentKey::generate(), nodes, threshold, chain)
    }

    /// Network whose escrow key is fixed, so capsules survive restarts.
    pub fn with_master_key(
        master: ContentKey,
        nodes: usize,
        threshold: usize,
        chain: Arc<dyn ChainReader>,
    ) -> Result<Self> {
        if threshold == 0 || threshold > nodes {
            return Err(ToolkitError::validation(format!(
                "threshold must be between 1 and {nodes}, got {threshold}"
            )));
        }
        Ok(Self {
            master,
            nodes,
            threshold,
            offline: AtomicUsize::new(0),
            chain,
        })
    }

    /// Mark `count` nodes as unreachable.
    pub fn set_offline(&self, count: usize) {
        self.offline.store(count.min(self.nodes), Ordering::SeqCst);
    }

    pub fn online(&self) -> usize {
        self.nodes - self.offline.load(Ordering::SeqCst)
    }

    fn has_quorum(&self) -> bool {
        self.online() >= self.threshold
    }
}

#[async_trait]
impl KeyNetwork for LocalKeyNetwork {
    async fn escrow(&self, policy: &AccessPolicy, key: &ContentKey) -> Result<KeyCapsule> {
        if !self.has_quorum() {
            return Err(ToolkitError::Encryption(format!(
                "key network quorum not reached ({} of {} nodes online, {} needed)",
                self.online(),
                self.nodes,
                self.threshold
            )));
        }
        let sealed = self
            .master
            .seal(key.as_bytes(), &policy_digest(policy))
            .map_err(|e| ToolkitError::Encryption(e.to_string()))?;
        tracing::debug!(conditions = policy.conditions.len(), "content key escrowed");
        Ok(KeyCapsule { sealed })
    }

    async fn release(
        &self,
        capsule: &KeyCapsule,
        policy: &AccessPolicy,
        auth: &AuthSig,
    ) -> Result<ContentKey> {
        if !self.has_quorum() {
            return Err(ToolkitError::Network(format!(
                "key network unavailable ({} of {} nodes online, {} needed)",
                self.online(),
                self.nodes,
                self.threshold
            )));
        }
        auth.verify()?;
        if !policy.evaluate(self.chain.as_ref(), &auth.address).await? {
            tracing::info!(requester = %auth.address, "key release denied");
            return Err(ToolkitError::Decryption(format!(
                "{} does not satisfy the access control conditions",
                auth.address
            )));
        }
        let raw = self
            .master
            .open(&capsule.sealed, &policy_digest(policy))
            .map_err(|_| ToolkitError::Decryption("key capsule does not match policy".into()))?;
        ContentKey::from_slice(&raw)
    }
}
