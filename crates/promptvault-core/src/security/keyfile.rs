//! Keyfile backend: one file per identifier inside a private directory.

use std::fs;
use std::io::{self, Read, Write};
use std::iter;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroizing;

use crate::error::{KeyStoreError, Result, VaultError};
use crate::fs::{ensure_private_dir, write_new};

use super::key_store::KeyStore;
use super::passphrase::validate_passphrase;

const KEYFILE_EXTENSION: &str = "key";

/// How keyfile contents are protected at rest.
#[derive(Clone)]
pub enum KeyFileMode {
    /// Raw key bytes; protection relies on file permissions alone.
    Plain,
    /// Key bytes wrapped with age passphrase encryption.
    Encrypted(SecretString),
}

impl std::fmt::Debug for KeyFileMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyFileMode::Plain => f.write_str("Plain"),
            KeyFileMode::Encrypted(_) => f.write_str("Encrypted([REDACTED])"),
        }
    }
}

/// Key store that keeps each secret in `<dir>/<id>.key`.
///
/// The directory is created with mode 0700 and keyfiles with 0600. New
/// keyfiles are published with a hard link, so a concurrent writer racing
/// on the same id observes `DuplicateEntry` rather than overwriting.
#[derive(Debug, Clone)]
pub struct FileKeyStore {
    dir: PathBuf,
    mode: KeyFileMode,
}

impl FileKeyStore {
    /// Create a store rooted at `dir`. Encrypted mode validates the
    /// passphrase up front.
    pub fn new(dir: impl Into<PathBuf>, mode: KeyFileMode) -> Result<Self> {
        if let KeyFileMode::Encrypted(passphrase) = &mode {
            validate_passphrase(passphrase.expose_secret())?;
        }
        Ok(Self {
            dir: dir.into(),
            mode,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the keyfile for `id`.
    pub fn keyfile_path(&self, id: &str) -> std::result::Result<PathBuf, KeyStoreError> {
        let valid = !id.is_empty()
            && !id.starts_with('.')
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
        if !valid {
            return Err(KeyStoreError::Backend(format!(
                "Key id {:?} is not usable as a filename",
                id
            )));
        }
        Ok(self.dir.join(format!("{}.{}", id, KEYFILE_EXTENSION)))
    }

    fn seal(&self, data: &[u8]) -> std::result::Result<Zeroizing<Vec<u8>>, KeyStoreError> {
        match &self.mode {
            KeyFileMode::Plain => Ok(Zeroizing::new(data.to_vec())),
            KeyFileMode::Encrypted(passphrase) => age_encrypt(data, passphrase)
                .map(Zeroizing::new)
                .map_err(|e| KeyStoreError::Backend(e.to_string())),
        }
    }

    fn unseal(&self, stored: Vec<u8>) -> std::result::Result<Zeroizing<Vec<u8>>, KeyStoreError> {
        let stored = Zeroizing::new(stored);
        match &self.mode {
            KeyFileMode::Plain => Ok(stored),
            KeyFileMode::Encrypted(passphrase) => age_decrypt(&stored, passphrase)
                .map(Zeroizing::new)
                .map_err(|e| KeyStoreError::Backend(e.to_string())),
        }
    }
}

impl KeyStore for FileKeyStore {
    fn save(&self, id: &str, data: &[u8]) -> std::result::Result<(), KeyStoreError> {
        let path = self.keyfile_path(id)?;
        ensure_private_dir(&self.dir)?;
        let sealed = self.seal(data)?;
        match write_new(&path, &sealed) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                Err(KeyStoreError::DuplicateEntry(id.to_string()))
            }
            Err(err) => Err(KeyStoreError::Backend(format!(
                "Failed to write keyfile {}: {}",
                path.display(),
                err
            ))),
        }
    }

    fn load(&self, id: &str) -> std::result::Result<Zeroizing<Vec<u8>>, KeyStoreError> {
        let path = self.keyfile_path(id)?;
        match fs::read(&path) {
            Ok(stored) => self.unseal(stored),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(KeyStoreError::ItemNotFound(id.to_string()))
            }
            Err(err) => Err(KeyStoreError::Backend(format!(
                "Failed to read keyfile {}: {}",
                path.display(),
                err
            ))),
        }
    }

    fn delete(&self, id: &str) -> std::result::Result<(), KeyStoreError> {
        let path = self.keyfile_path(id)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Encrypt data using age passphrase-based encryption (scrypt KDF).
fn age_encrypt(data: &[u8], passphrase: &SecretString) -> Result<Vec<u8>> {
    let encryptor = age::Encryptor::with_user_passphrase(passphrase.clone());

    let mut encrypted = Vec::new();
    let mut writer = encryptor
        .wrap_output(&mut encrypted)
        .map_err(|e| VaultError::EncryptionFailed(format!("Failed to create encryptor: {}", e)))?;
    writer
        .write_all(data)
        .map_err(|e| VaultError::EncryptionFailed(format!("Encryption write failed: {}", e)))?;
    writer
        .finish()
        .map_err(|e| VaultError::EncryptionFailed(format!("Encryption finish failed: {}", e)))?;

    Ok(encrypted)
}

/// Decrypt age passphrase-encrypted data.
fn age_decrypt(encrypted: &[u8], passphrase: &SecretString) -> Result<Vec<u8>> {
    let decryptor = age::Decryptor::new(encrypted)
        .map_err(|e| VaultError::KeyUnavailable(format!("Keyfile is not age data: {}", e)))?;

    let identity = age::scrypt::Identity::new(passphrase.clone());
    let mut reader = decryptor
        .decrypt(iter::once(&identity as &dyn age::Identity))
        .map_err(|e| match e {
            age::DecryptError::NoMatchingKeys
            | age::DecryptError::DecryptionFailed
            | age::DecryptError::KeyDecryptionFailed => {
                VaultError::KeyUnavailable("Incorrect keyfile passphrase".to_string())
            }
            _ => VaultError::KeyUnavailable(format!("Keyfile decryption failed: {}", e)),
        })?;

    let mut decrypted = Vec::new();
    reader
        .read_to_end(&mut decrypted)
        .map_err(|e| VaultError::KeyUnavailable(format!("Failed to read keyfile: {}", e)))?;

    Ok(decrypted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn secret(value: &str) -> SecretString {
        SecretString::from(value.to_string())
    }

    #[test]
    fn test_plain_round_trip() {
        let dir = tempdir().unwrap();
        let store = FileKeyStore::new(dir.path().join("keys"), KeyFileMode::Plain).unwrap();

        store.save("master", &[9u8; 32]).unwrap();
        assert_eq!(store.load("master").unwrap().as_slice(), &[9u8; 32]);
        assert_eq!(
            fs::read(store.keyfile_path("master").unwrap()).unwrap(),
            vec![9u8; 32]
        );
    }

    #[test]
    fn test_encrypted_file_is_not_raw_key() {
        let dir = tempdir().unwrap();
        let store = FileKeyStore::new(
            dir.path(),
            KeyFileMode::Encrypted(secret("correct horse battery")),
        )
        .unwrap();

        store.save("master", &[5u8; 32]).unwrap();
        let on_disk = fs::read(store.keyfile_path("master").unwrap()).unwrap();
        assert_ne!(on_disk, vec![5u8; 32]);
        assert_eq!(store.load("master").unwrap().as_slice(), &[5u8; 32]);
    }

    #[test]
    fn test_wrong_passphrase_is_backend_error() {
        let dir = tempdir().unwrap();
        let writer =
            FileKeyStore::new(dir.path(), KeyFileMode::Encrypted(secret("first-passphrase")))
                .unwrap();
        writer.save("master", &[1u8; 32]).unwrap();

        let reader =
            FileKeyStore::new(dir.path(), KeyFileMode::Encrypted(secret("second-passphrase")))
                .unwrap();
        let err = reader.load("master").unwrap_err();
        assert!(matches!(err, KeyStoreError::Backend(_)));
        assert!(err.to_string().contains("Incorrect keyfile passphrase"));
    }

    #[test]
    fn test_short_passphrase_rejected() {
        let dir = tempdir().unwrap();
        let result = FileKeyStore::new(dir.path(), KeyFileMode::Encrypted(secret("short")));
        assert!(matches!(result, Err(VaultError::InvalidInput(_))));
    }

    #[test]
    fn test_duplicate_and_missing() {
        let dir = tempdir().unwrap();
        let store = FileKeyStore::new(dir.path(), KeyFileMode::Plain).unwrap();

        assert!(matches!(
            store.load("master"),
            Err(KeyStoreError::ItemNotFound(_))
        ));
        store.save("master", b"one").unwrap();
        assert!(matches!(
            store.save("master", b"two"),
            Err(KeyStoreError::DuplicateEntry(_))
        ));
        store.delete("master").unwrap();
        store.delete("master").unwrap();
        store.save("master", b"three").unwrap();
        assert_eq!(store.load("master").unwrap().as_slice(), b"three");
    }

    #[test]
    fn test_rejects_path_like_ids() {
        let dir = tempdir().unwrap();
        let store = FileKeyStore::new(dir.path(), KeyFileMode::Plain).unwrap();
        assert!(store.keyfile_path("../escape").is_err());
        assert!(store.keyfile_path(".hidden").is_err());
        assert!(store.keyfile_path("").is_err());
        assert!(store.keyfile_path("promptvault.master-key.v1").is_ok());
    }

    #[test]
    fn test_mode_debug_redacts_passphrase() {
        let mode = KeyFileMode::Encrypted(secret("super-secret-passphrase"));
        assert!(!format!("{:?}", mode).contains("super-secret"));
    }
}
