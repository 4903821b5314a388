//! Encryption boundary: key storage, the AEAD cipher, and the service that
//! composes them.
//!
//! Only block content crosses this boundary. Everything else the store
//! persists is plaintext metadata.

mod cipher;
mod key;
mod key_store;
mod keychain;
mod keyfile;
mod passphrase;
mod service;

pub use cipher::{Aes256GcmCipher, Cipher, NONCE_LEN, TAG_LEN};
pub use key::{MasterKey, KEY_LENGTH};
pub use key_store::{KeyStore, MemoryKeyStore};
pub use keychain::{KeychainKeyStore, DEFAULT_KEYCHAIN_SERVICE};
pub use keyfile::{FileKeyStore, KeyFileMode};
pub use passphrase::validate_passphrase;
pub use service::{CryptoService, SecurityService, MASTER_KEY_ID};
