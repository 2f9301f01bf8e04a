use chacha20poly1305::aead::{Aead, Payload};
use chacha20poly1305::{Key, KeyInit, XChaCha20Poly1305, XNonce};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{Result, ToolkitError};

pub const KEY_SIZE: usize = 32;
pub const NONCE_SIZE: usize = 24;
/// Poly1305 tag appended to every ciphertext.
pub const TAG_SIZE: usize = 16;

/// Per-file XChaCha20-Poly1305 key; zeroised on drop.
#[derive(Clone)]
pub struct ContentKey {
    inner: Zeroizing<[u8; KEY_SIZE]>,
}

impl std::fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ContentKey(..)")
    }
}

impl ContentKey {
    pub fn generate() -> Self {
        let mut bytes = Zeroizing::new([0u8; KEY_SIZE]);
        OsRng.fill_bytes(&mut *bytes);
        Self { inner: bytes }
    }

    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self {
            inner: Zeroizing::new(bytes),
        }
    }

    /// Accepts exactly [`KEY_SIZE`] bytes, e.g. a key released by a key network.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let raw: [u8; KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| ToolkitError::Malformed(format!("key must be {KEY_SIZE} bytes")))?;
        Ok(Self::from_bytes(raw))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.inner
    }

    fn cipher(&self) -> XChaCha20Poly1305 {
        XChaCha20Poly1305::new(Key::from_slice(&self.inner[..]))
    }

    /// Seal `plaintext` under a fresh random nonce, binding `aad`.
    pub fn seal(&self, plaintext: &[u8], aad: &[u8]) -> Result<Sealed> {
        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);
        let ciphertext = self
            .cipher()
            .encrypt(
                XNonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad,
                },
            )
            .map_err(|_| ToolkitError::Encryption("unable to seal payload".into()))?;
        Ok(Sealed { nonce, ciphertext })
    }

    /// Open a payload produced by [`ContentKey::seal`] with the same `aad`.
    pub fn open(&self, sealed: &Sealed, aad: &[u8]) -> Result<Vec<u8>> {
        self.cipher()
            .decrypt(
                XNonce::from_slice(&sealed.nonce),
                Payload {
                    msg: &sealed.ciphertext,
                    aad,
                },
            )
            .map_err(|_| ToolkitError::Decryption("unable to open payload".into()))
    }
}

/// Nonce plus ciphertext (tag included).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Sealed {
    pub nonce: [u8; NONCE_SIZE],
    pub ciphertext: Vec<u8>,
}

impl Sealed {
    /// `nonce || ciphertext`
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(NONCE_SIZE + self.ciphertext.len());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < NONCE_SIZE + TAG_SIZE {
            return Err(ToolkitError::Malformed("sealed payload too short".into()));
        }
        let (nonce, ciphertext) = bytes.split_at(NONCE_SIZE);
        let mut raw = [0u8; NONCE_SIZE];
        raw.copy_from_slice(nonce);
        Ok(Self {
            nonce: raw,
            ciphertext: ciphertext.to_vec(),
        })
    }
}
