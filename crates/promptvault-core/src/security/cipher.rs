//! AES-256-GCM sealing of block content.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};

use crate::error::{Result, VaultError};

use super::key::MasterKey;

/// Nonce length in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// Authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// Authenticated-encryption primitive over byte strings.
pub trait Cipher: Send + Sync {
    /// Seal `plaintext`. Each call uses a fresh nonce.
    fn seal(&self, key: &MasterKey, plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Authenticate and open a blob produced by [`Cipher::seal`].
    fn open(&self, key: &MasterKey, blob: &[u8]) -> Result<Vec<u8>>;
}

/// AES-256-GCM with a random 96-bit nonce.
///
/// Blob layout: `nonce (12) || ciphertext || tag (16)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Aes256GcmCipher;

impl Cipher for Aes256GcmCipher {
    fn seal(&self, key: &MasterKey, plaintext: &[u8]) -> Result<Vec<u8>> {
        let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
            .map_err(|_| VaultError::EncryptionFailed("invalid AES key".to_string()))?;

        let mut nonce = [0u8; NONCE_LEN];
        getrandom::getrandom(&mut nonce)
            .map_err(|e| VaultError::EncryptionFailed(format!("RNG unavailable: {}", e)))?;

        let sealed = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| VaultError::EncryptionFailed("failed to seal payload".to_string()))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + sealed.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&sealed);
        Ok(blob)
    }

    fn open(&self, key: &MasterKey, blob: &[u8]) -> Result<Vec<u8>> {
        if blob.len() < NONCE_LEN + TAG_LEN {
            return Err(VaultError::DecryptionFailed);
        }
        let (nonce, sealed) = blob.split_at(NONCE_LEN);

        let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
            .map_err(|_| VaultError::DecryptionFailed)?;
        cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| VaultError::DecryptionFailed)
    }
}
