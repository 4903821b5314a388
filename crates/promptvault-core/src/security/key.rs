//! Master key material.

use zeroize::ZeroizeOnDrop;

use crate::error::{Result, VaultError};

/// Length of the master key in bytes (256 bits).
pub const KEY_LENGTH: usize = 32;

/// The symmetric key that seals block content.
///
/// Key bytes are zeroized when the value is dropped.
#[derive(Clone, ZeroizeOnDrop)]
pub struct MasterKey {
    key: [u8; KEY_LENGTH],
}

impl MasterKey {
    /// Generate a fresh key from the operating system RNG.
    pub fn generate() -> Result<Self> {
        // Filled in place so no unzeroized copy of the key is left behind.
        let mut master = Self {
            key: [0u8; KEY_LENGTH],
        };
        getrandom::getrandom(&mut master.key)
            .map_err(|e| VaultError::KeyGenerationFailed(format!("RNG unavailable: {}", e)))?;
        Ok(master)
    }

    /// Rebuild a key from stored bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEY_LENGTH {
            return Err(VaultError::KeyUnavailable(format!(
                "Stored key has {} bytes, expected {}",
                bytes.len(),
                KEY_LENGTH
            )));
        }
        let mut master = Self {
            key: [0u8; KEY_LENGTH],
        };
        master.key.copy_from_slice(bytes);
        Ok(master)
    }

    /// Raw key bytes. Use only for immediate cipher operations.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_keys_differ() {
        let a = MasterKey::generate().unwrap();
        let b = MasterKey::generate().unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_from_slice_rejects_wrong_length() {
        let err = MasterKey::from_slice(&[7u8; 16]).unwrap_err();
        assert!(matches!(err, VaultError::KeyUnavailable(_)));
        assert!(MasterKey::from_slice(&[7u8; KEY_LENGTH]).is_ok());
        assert!(MasterKey::from_slice(&[7u8; KEY_LENGTH + 1]).is_err());
    }

    #[test]
    fn test_from_slice_keeps_stored_bytes() {
        let stored: Vec<u8> = (0..KEY_LENGTH as u8).collect();
        let key = MasterKey::from_slice(&stored).unwrap();
        assert_eq!(key.as_bytes().as_slice(), stored.as_slice());
    }

    #[test]
    fn test_debug_redacts() {
        let key = MasterKey::generate().unwrap();
        let debug_output = format!("{:?}", key);
        assert!(debug_output.contains("REDACTED"));

        let key_hex = hex::encode(&key.as_bytes()[..4]);
        assert!(!debug_output.contains(&key_hex));
    }
}
