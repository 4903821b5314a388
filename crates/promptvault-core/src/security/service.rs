//! Security service: lazy key provisioning plus the cipher.

use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::error::{KeyStoreError, Result, VaultError};

use super::cipher::{Aes256GcmCipher, Cipher};
use super::key::MasterKey;
use super::key_store::KeyStore;

/// Identifier under which the master key is stored.
///
/// Versioned so a future rotation can introduce a new key alongside the old.
pub const MASTER_KEY_ID: &str = "promptvault.master-key.v1";

/// Encrypts and decrypts sensitive text.
pub trait SecurityService: Send + Sync {
    /// Seal `plaintext`. Two calls with the same input produce different blobs.
    fn encrypt(&self, plaintext: &str) -> Result<Vec<u8>>;

    /// Authenticate and open `ciphertext`, yielding UTF-8 text.
    fn decrypt(&self, ciphertext: &[u8]) -> Result<String>;
}

/// [`SecurityService`] backed by a [`KeyStore`] and a [`Cipher`].
///
/// The master key is read from the key store on every call and never cached.
/// When the store has no key yet, one is generated and saved before first
/// use. Provisioning runs behind a lock so concurrent first calls on one
/// service agree on a single key; a `DuplicateEntry` from the store means
/// another service won the race, and that key is loaded instead.
pub struct CryptoService {
    key_store: Arc<dyn KeyStore>,
    key_id: String,
    cipher: Arc<dyn Cipher>,
    provisioning: Mutex<()>,
}

impl CryptoService {
    pub fn new(key_store: Arc<dyn KeyStore>, key_id: impl Into<String>) -> Self {
        Self::with_cipher(key_store, key_id, Arc::new(Aes256GcmCipher))
    }

    pub fn with_cipher(
        key_store: Arc<dyn KeyStore>,
        key_id: impl Into<String>,
        cipher: Arc<dyn Cipher>,
    ) -> Self {
        Self {
            key_store,
            key_id: key_id.into(),
            cipher,
            provisioning: Mutex::new(()),
        }
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Load the master key, generating and storing one if none exists.
    fn master_key(&self) -> Result<MasterKey> {
        if let Some(key) = self.load_key()? {
            return Ok(key);
        }

        let _guard = self
            .provisioning
            .lock()
            .map_err(|_| VaultError::KeyUnavailable("Key provisioning lock poisoned".to_string()))?;

        // Another caller may have provisioned while we waited.
        if let Some(key) = self.load_key()? {
            return Ok(key);
        }

        let key = MasterKey::generate()?;
        match self.key_store.save(&self.key_id, key.as_bytes()) {
            Ok(()) => {
                info!(key_id = %self.key_id, "Provisioned new master key");
                Ok(key)
            }
            Err(KeyStoreError::DuplicateEntry(_)) => {
                debug!(key_id = %self.key_id, "Master key provisioned concurrently, reloading");
                self.load_key()?.ok_or_else(|| {
                    VaultError::KeyUnavailable(format!(
                        "Key {} vanished after concurrent provisioning",
                        self.key_id
                    ))
                })
            }
            Err(err) => Err(VaultError::KeyGenerationFailed(err.to_string())),
        }
    }

    fn load_key(&self) -> Result<Option<MasterKey>> {
        match self.key_store.load(&self.key_id) {
            Ok(bytes) => MasterKey::from_slice(&bytes).map(Some),
            Err(KeyStoreError::ItemNotFound(_)) => Ok(None),
            Err(err) => Err(VaultError::KeyUnavailable(err.to_string())),
        }
    }
}

impl std::fmt::Debug for CryptoService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoService")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

impl SecurityService for CryptoService {
    fn encrypt(&self, plaintext: &str) -> Result<Vec<u8>> {
        let key = self.master_key()?;
        self.cipher.seal(&key, plaintext.as_bytes())
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<String> {
        let key = self.master_key()?;
        let plaintext = self.cipher.open(&key, ciphertext)?;
        String::from_utf8(plaintext).map_err(|_| VaultError::DecryptionFailed)
    }
}
