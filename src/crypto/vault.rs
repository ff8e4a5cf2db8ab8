//! Record Vault
//!
//! At-rest encryption of record payloads. AES-256-GCM with a key derived once
//! from the configured secret and a fresh random nonce per encryption.
//!
//! Blob layout: `v1:` followed by base64(nonce || ciphertext || tag).

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::LedgerError;
use crate::validation::RecordPayload;

const BLOB_VERSION_PREFIX: &str = "v1:";
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

pub struct RecordVault {
    cipher: Aes256Gcm,
}

impl RecordVault {
    /// Derive the vault key from `secret` (SHA-256 of the secret bytes)
    pub fn from_secret(secret: &str) -> Result<Self, LedgerError> {
        if secret.is_empty() {
            return Err(LedgerError::Config("vault secret is empty".to_string()));
        }
        let key = Sha256::digest(secret.as_bytes());
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|_| LedgerError::Config("vault key has wrong length".to_string()))?;
        Ok(Self { cipher })
    }

    /// Encrypt a payload into an opaque blob
    pub fn encrypt(&self, payload: &RecordPayload) -> Result<String, LedgerError> {
        let plaintext = serde_json::to_vec(payload)?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_ref())
            .map_err(|_| LedgerError::Config("record encryption failed".to_string()))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        Ok(format!("{}{}", BLOB_VERSION_PREFIX, BASE64.encode(blob)))
    }

    /// Decrypt a blob produced by [`RecordVault::encrypt`]
    ///
    /// Wrong key, truncation and tampering all surface as `Decryption`.
    pub fn decrypt(&self, blob: &str) -> Result<RecordPayload, LedgerError> {
        let encoded = blob
            .strip_prefix(BLOB_VERSION_PREFIX)
            .ok_or_else(|| LedgerError::decryption("unknown blob version"))?;

        let raw = BASE64
            .decode(encoded.as_bytes())
            .map_err(|e| LedgerError::decryption(format!("blob is not base64: {}", e)))?;

        if raw.len() < NONCE_LEN + TAG_LEN {
            return Err(LedgerError::decryption(format!(
                "blob truncated ({} bytes)",
                raw.len()
            )));
        }

        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| LedgerError::decryption("authentication failed"))?;

        serde_json::from_slice(&plaintext)
            .map_err(|e| LedgerError::decryption(format!("payload does not match schema: {}", e)))
    }
}

impl std::fmt::Debug for RecordVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordVault").finish_non_exhaustive()
    }
}
