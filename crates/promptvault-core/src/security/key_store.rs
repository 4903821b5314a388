//! Key store contract and the in-process backend.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use zeroize::Zeroizing;

use crate::error::KeyStoreError;

/// Durable storage for symmetric secrets addressed by a stable identifier.
///
/// Implementations must be safe to share between threads. `save` never
/// replaces an existing item: callers delete first when rotating.
pub trait KeyStore: Send + Sync {
    /// Store `data` under `id`. Fails with `DuplicateEntry` if `id` exists.
    fn save(&self, id: &str, data: &[u8]) -> Result<(), KeyStoreError>;

    /// Load the item stored under `id`. Fails with `ItemNotFound` if absent.
    fn load(&self, id: &str) -> Result<Zeroizing<Vec<u8>>, KeyStoreError>;

    /// Remove the item stored under `id`. Removing an absent item succeeds.
    fn delete(&self, id: &str) -> Result<(), KeyStoreError>;
}

/// Key store held in process memory. Items vanish when the value is dropped.
#[derive(Default)]
pub struct MemoryKeyStore {
    items: Mutex<HashMap<String, Zeroizing<Vec<u8>>>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_items(&self) -> Result<MutexGuard<'_, HashMap<String, Zeroizing<Vec<u8>>>>, KeyStoreError> {
        self.items
            .lock()
            .map_err(|_| KeyStoreError::Backend("Memory key store poisoned".to_string()))
    }
}

impl std::fmt::Debug for MemoryKeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.items.lock().map(|items| items.len()).unwrap_or(0);
        f.debug_struct("MemoryKeyStore")
            .field("items", &count)
            .finish()
    }
}

impl KeyStore for MemoryKeyStore {
    fn save(&self, id: &str, data: &[u8]) -> Result<(), KeyStoreError> {
        let mut items = self.lock_items()?;
        if items.contains_key(id) {
            return Err(KeyStoreError::DuplicateEntry(id.to_string()));
        }
        items.insert(id.to_string(), Zeroizing::new(data.to_vec()));
        Ok(())
    }

    fn load(&self, id: &str) -> Result<Zeroizing<Vec<u8>>, KeyStoreError> {
        let items = self.lock_items()?;
        items
            .get(id)
            .cloned()
            .ok_or_else(|| KeyStoreError::ItemNotFound(id.to_string()))
    }

    fn delete(&self, id: &str) -> Result<(), KeyStoreError> {
        self.lock_items()?.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_then_load() {
        let store = MemoryKeyStore::new();
        store.save("k", b"secret").unwrap();
        assert_eq!(store.load("k").unwrap().as_slice(), b"secret");
    }

    #[test]
    fn test_save_duplicate_rejected() {
        let store = MemoryKeyStore::new();
        store.save("k", b"one").unwrap();
        let err = store.save("k", b"two").unwrap_err();
        assert!(matches!(err, KeyStoreError::DuplicateEntry(_)));
        assert_eq!(store.load("k").unwrap().as_slice(), b"one");
    }

    #[test]
    fn test_load_missing() {
        let store = MemoryKeyStore::new();
        assert!(matches!(
            store.load("missing"),
            Err(KeyStoreError::ItemNotFound(_))
        ));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let store = MemoryKeyStore::new();
        store.save("k", b"x").unwrap();
        store.delete("k").unwrap();
        store.delete("k").unwrap();
        assert!(store.load("k").is_err());
        store.save("k", b"y").unwrap();
    }

    #[test]
    fn test_debug_hides_items() {
        let store = MemoryKeyStore::new();
        store.save("k", b"visible?").unwrap();
        let output = format!("{:?}", store);
        assert!(!output.contains("visible"));
        assert!(output.contains("items: 1"));
    }
}
