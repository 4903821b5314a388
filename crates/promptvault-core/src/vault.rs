//! Composition root: wires store, key store, security service and
//! repository from a [`VaultConfig`].

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use tracing::info;

use crate::config::{KeyBackend, KeyfileMode, VaultConfig};
use crate::error::{Result, VaultError};
use crate::repository::SqlitePromptRepository;
use crate::security::{
    CryptoService, FileKeyStore, KeyFileMode, KeyStore, KeychainKeyStore, MemoryKeyStore,
    SecurityService,
};
use crate::store::{Store, StoreOptions};

/// An opened vault.
#[derive(Debug, Clone)]
pub struct Vault {
    store: Arc<Store>,
    repository: SqlitePromptRepository,
}

impl Vault {
    /// Open the vault described by `config`.
    ///
    /// `passphrase` is required only for the encrypted keyfile backend.
    pub fn open(config: &VaultConfig, passphrase: Option<SecretString>) -> Result<Self> {
        config.validate()?;
        let key_store = key_store_for(config, passphrase)?;
        Self::open_with_key_store(config, key_store)
    }

    /// Open with an explicit key store, ignoring the configured backend.
    pub fn open_with_key_store(config: &VaultConfig, key_store: Arc<dyn KeyStore>) -> Result<Self> {
        config.validate()?;
        let store = if config.is_in_memory() {
            Store::open_in_memory()?
        } else {
            let options = StoreOptions {
                busy_timeout: Duration::from_millis(config.store.busy_timeout_ms),
            };
            Store::open(&config.store_path(), &options)?
        };
        let store = Arc::new(store);

        let security: Arc<dyn SecurityService> = Arc::new(CryptoService::new(
            key_store,
            config.security.key_id.clone(),
        ));
        let repository = SqlitePromptRepository::new(store.clone(), security)
            .with_orphan_policy(config.reconcile.orphan_policy);

        info!(
            store = %config.store.path,
            backend = ?config.security.backend,
            orphan_policy = ?config.reconcile.orphan_policy,
            "Vault opened"
        );
        Ok(Self { store, repository })
    }

    pub fn repository(&self) -> &SqlitePromptRepository {
        &self.repository
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn check_integrity(&self) -> Result<()> {
        self.store.check_integrity()
    }
}

fn key_store_for(config: &VaultConfig, passphrase: Option<SecretString>) -> Result<Arc<dyn KeyStore>> {
    let key_store: Arc<dyn KeyStore> = match config.security.backend {
        KeyBackend::Memory => Arc::new(MemoryKeyStore::new()),
        KeyBackend::Keychain => Arc::new(KeychainKeyStore::new(
            config.security.keychain_service.clone(),
        )),
        KeyBackend::Keyfile => {
            let dir = config
                .keyfile_dir()
                .ok_or_else(|| VaultError::Config("security.keyfile_dir is not set".to_string()))?;
            let mode = match config.security.keyfile_mode {
                KeyfileMode::Plain => KeyFileMode::Plain,
                KeyfileMode::Encrypted => KeyFileMode::Encrypted(passphrase.ok_or_else(|| {
                    VaultError::InvalidInput(
                        "A passphrase is required for encrypted keyfiles".to_string(),
                    )
                })?),
            };
            Arc::new(FileKeyStore::new(dir, mode)?)
        }
    };
    Ok(key_store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_ephemeral_vault_opens() {
        let vault = Vault::open(&VaultConfig::ephemeral(), None).unwrap();
        assert!(vault.store().path().is_none());
        vault.check_integrity().unwrap();
    }

    #[test]
    fn test_encrypted_keyfile_requires_passphrase() {
        let dir = tempdir().unwrap();
        let config = VaultConfig::ephemeral()
            .with_keyfile(dir.path().join("keys"), KeyfileMode::Encrypted);
        assert!(matches!(
            Vault::open(&config, None),
            Err(VaultError::InvalidInput(_))
        ));
        assert!(Vault::open(
            &config,
            Some(SecretString::from("long enough passphrase".to_string()))
        )
        .is_ok());
    }

    #[test]
    fn test_invalid_config_rejected_before_opening() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prompts.db");
        let mut config = VaultConfig::new(path.clone(), KeyBackend::Memory);
        config.store.busy_timeout_ms = 0;
        assert!(Vault::open(&config, None).is_err());
        assert!(!path.exists());
    }
}
