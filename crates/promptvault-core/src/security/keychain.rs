//! OS credential store backend.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use zeroize::Zeroizing;

use crate::error::KeyStoreError;

use super::key_store::KeyStore;

/// Default service name under which secrets are filed.
pub const DEFAULT_KEYCHAIN_SERVICE: &str = "promptvault";

/// Key store backed by the platform credential store (macOS Keychain,
/// Secret Service, Windows Credential Manager) through `keyring`.
///
/// Secrets are stored base64-encoded because the credential APIs carry text.
/// Duplicate detection reads before writing; two processes racing on the
/// same id are resolved by the security service re-loading after save.
#[derive(Debug, Clone)]
pub struct KeychainKeyStore {
    service: String,
}

impl KeychainKeyStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    fn entry(&self, id: &str) -> Result<keyring::Entry, KeyStoreError> {
        keyring::Entry::new(&self.service, id)
            .map_err(|e| KeyStoreError::Backend(format!("Keychain entry failed: {}", e)))
    }
}

impl Default for KeychainKeyStore {
    fn default() -> Self {
        Self::new(DEFAULT_KEYCHAIN_SERVICE)
    }
}

impl KeyStore for KeychainKeyStore {
    fn save(&self, id: &str, data: &[u8]) -> Result<(), KeyStoreError> {
        let entry = self.entry(id)?;
        match entry.get_password() {
            Ok(_) => return Err(KeyStoreError::DuplicateEntry(id.to_string())),
            Err(keyring::Error::NoEntry) => {}
            Err(err) => {
                return Err(KeyStoreError::Backend(format!(
                    "Keychain read failed: {}",
                    err
                )))
            }
        }
        let encoded = Zeroizing::new(STANDARD.encode(data));
        entry
            .set_password(&encoded)
            .map_err(|e| KeyStoreError::Backend(format!("Keychain write failed: {}", e)))
    }

    fn load(&self, id: &str) -> Result<Zeroizing<Vec<u8>>, KeyStoreError> {
        let entry = self.entry(id)?;
        let encoded = match entry.get_password() {
            Ok(value) => Zeroizing::new(value),
            Err(keyring::Error::NoEntry) => {
                return Err(KeyStoreError::ItemNotFound(id.to_string()))
            }
            Err(err) => {
                return Err(KeyStoreError::Backend(format!(
                    "Keychain read failed: {}",
                    err
                )))
            }
        };
        STANDARD
            .decode(encoded.as_bytes())
            .map(Zeroizing::new)
            .map_err(|e| KeyStoreError::Backend(format!("Keychain item is not base64: {}", e)))
    }

    fn delete(&self, id: &str) -> Result<(), KeyStoreError> {
        let entry = self.entry(id)?;
        match entry.delete_password() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(KeyStoreError::Backend(format!(
                "Keychain delete failed: {}",
                err
            ))),
        }
    }
}
