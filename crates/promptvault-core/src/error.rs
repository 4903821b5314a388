//! Error types for promptvault core operations.
//!
//! `VaultError` is the single error surfaced by the repository, the store
//! and the security service. Key store backends report the narrower
//! `KeyStoreError`, which the security service folds into
//! `KeyUnavailable` / `KeyGenerationFailed` during key provisioning.

use thiserror::Error;

/// Result type alias for promptvault operations.
pub type Result<T> = std::result::Result<T, VaultError>;

/// Core error type for promptvault operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// The key store could not supply the master key
    #[error("Encryption key unavailable: {0}")]
    KeyUnavailable(String),

    /// A fresh master key could not be stored
    #[error("Encryption key generation failed: {0}")]
    KeyGenerationFailed(String),

    /// The cipher refused to seal the plaintext
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Authentication tag mismatch, truncated blob, or non-UTF-8 plaintext
    #[error("Decryption failed: ciphertext is corrupted or was sealed with another key")]
    DecryptionFailed,

    /// Plaintext or ciphertext cannot be represented in the expected form
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Storage engine error (generic)
    #[error("Storage error: {0}")]
    Store(String),

    /// SQLite-specific storage error
    #[error("SQLite error: {source}")]
    Sqlite {
        #[from]
        source: rusqlite::Error,
    },

    /// Store written by a newer schema than this build understands
    #[error("Store schema version {found} is newer than supported {supported}")]
    UnsupportedSchemaVersion { found: u32, supported: u32 },

    /// Configuration could not be read or is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid caller input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// I/O error
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl VaultError {
    /// True for failures raised by the storage engine rather than the
    /// security boundary.
    pub fn is_store_error(&self) -> bool {
        matches!(
            self,
            VaultError::Store(_)
                | VaultError::Sqlite { .. }
                | VaultError::UnsupportedSchemaVersion { .. }
                | VaultError::Io { .. }
        )
    }
}

/// Errors reported by a [`KeyStore`](crate::security::KeyStore) backend.
#[derive(Debug, Error)]
pub enum KeyStoreError {
    /// No item stored under the identifier
    #[error("Key store item not found: {0}")]
    ItemNotFound(String),

    /// An item already exists under the identifier
    #[error("Key store item already exists: {0}")]
    DuplicateEntry(String),

    /// Backend-specific failure (OS keychain, filesystem, passphrase)
    #[error("Key store backend error: {0}")]
    Backend(String),
}

impl From<std::io::Error> for KeyStoreError {
    fn from(err: std::io::Error) -> Self {
        KeyStoreError::Backend(err.to_string())
    }
}
