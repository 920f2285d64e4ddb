//! An opaque, password-wrapped private key.
//!
//! The unwrapped key is never returned to the caller — `with_unwrapped`
//! decrypts into a locked, zeroize-on-drop buffer and hands a borrowed
//! slice to the closure, so the plaintext key never outlives the call
//! that needed it.

use echolock_crypto::cipher::{self, CryptoError, EncryptedBlob};
use echolock_crypto::memory::with_locked_scope;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WrappedPrivateKey {
    iterations: u32,
    salt: [u8; cipher::SALT_LEN],
    nonce: [u8; cipher::NONCE_LEN],
    ciphertext: Vec<u8>,
}

impl WrappedPrivateKey {
    pub fn wrap(raw_key: &[u8], password: &str, iterations: u32) -> Result<Self, CryptoError> {
        let blob = cipher::encrypt(raw_key, password, iterations)?;
        Ok(Self {
            iterations: blob.iterations,
            salt: blob.salt,
            nonce: blob.nonce,
            ciphertext: blob.ciphertext,
        })
    }

    fn as_blob(&self) -> EncryptedBlob {
        EncryptedBlob {
            salt: self.salt,
            nonce: self.nonce,
            ciphertext: self.ciphertext.clone(),
            iterations: self.iterations,
        }
    }

    /// Decrypt the key into a locked, zeroize-on-drop buffer, run `f`
    /// against it, and return `f`'s result. The plaintext key bytes
    /// exist only for the duration of this call.
    pub fn with_unwrapped<R>(
        &self,
        password: &str,
        f: impl FnOnce(&[u8]) -> R,
    ) -> Result<R, CryptoError> {
        let plaintext = cipher::decrypt(&self.as_blob(), password)?;
        Ok(with_locked_scope(plaintext, f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ITERS: u32 = cipher::MIN_PBKDF2_ITERATIONS;

    #[test]
    fn wrap_and_unwrap_roundtrip() {
        let key = [0xABu8; 32];
        let wrapped = WrappedPrivateKey::wrap(&key, "hunter2", ITERS).unwrap();
        let recovered = wrapped
            .with_unwrapped("hunter2", |bytes| bytes.to_vec())
            .unwrap();
        assert_eq!(recovered, key.to_vec());
    }

    #[test]
    fn wrong_password_fails_to_unwrap() {
        let key = [0x01u8; 32];
        let wrapped = WrappedPrivateKey::wrap(&key, "right", ITERS).unwrap();
        assert!(wrapped.with_unwrapped("wrong", |b| b.to_vec()).is_err());
    }

    #[test]
    fn serializes_without_exposing_plaintext() {
        let key = [0x42u8; 32];
        let wrapped = WrappedPrivateKey::wrap(&key, "pw", ITERS).unwrap();
        let json = serde_json::to_string(&wrapped).unwrap();
        assert!(!json.contains("42424242"));
    }
}
