//! Password-based authenticated encryption for switch secrets.
//!
//! Key derivation uses PBKDF2-HMAC-SHA256 (NIST SP 800-132 compatible)
//! rather than a memory-hard KDF, so that derivation cost is predictable
//! and bounded on the low-resource hosts EchoLock daemons run on.
//! Encryption is AES-256-GCM. Each call generates a fresh random salt
//! and nonce; nothing about the password is ever persisted.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use hmac::Hmac;
use pbkdf2::pbkdf2;
use rand::RngCore;
use sha2::Sha256;
use thiserror::Error;

pub const SALT_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;
pub const KEY_LEN: usize = 32;

/// Minimum PBKDF2 iteration count EchoLock will accept or produce.
pub const MIN_PBKDF2_ITERATIONS: u32 = 600_000;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("password must not be empty")]
    InvalidInput,
    #[error("iteration count {0} is below the minimum of {MIN_PBKDF2_ITERATIONS}")]
    WeakIterations(u32),
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("decryption failed: wrong password or corrupted data")]
    DecryptionAuthFail,
    #[error("key derivation failed: {0}")]
    KeyDerivationFailed(String),
    #[error("malformed ciphertext envelope")]
    InvalidFormat,
}

/// A self-contained encrypted blob: salt || nonce || ciphertext(+tag).
#[derive(Debug, Clone)]
pub struct EncryptedBlob {
    pub salt: [u8; SALT_LEN],
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
    pub iterations: u32,
}

impl EncryptedBlob {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + SALT_LEN + NONCE_LEN + self.ciphertext.len());
        out.extend_from_slice(&self.iterations.to_be_bytes());
        out.extend_from_slice(&self.salt);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let header = 4 + SALT_LEN + NONCE_LEN;
        if bytes.len() < header + 17 {
            return Err(CryptoError::InvalidFormat);
        }
        let iterations = u32::from_be_bytes(bytes[0..4].try_into().unwrap());
        let mut salt = [0u8; SALT_LEN];
        let mut nonce = [0u8; NONCE_LEN];
        salt.copy_from_slice(&bytes[4..4 + SALT_LEN]);
        nonce.copy_from_slice(&bytes[4 + SALT_LEN..header]);
        let ciphertext = bytes[header..].to_vec();
        Ok(Self {
            salt,
            nonce,
            ciphertext,
            iterations,
        })
    }
}

pub fn derive_key(
    password: &str,
    salt: &[u8; SALT_LEN],
    iterations: u32,
) -> Result<[u8; KEY_LEN], CryptoError> {
    if iterations < MIN_PBKDF2_ITERATIONS {
        return Err(CryptoError::WeakIterations(iterations));
    }
    let mut key = [0u8; KEY_LEN];
    pbkdf2::<Hmac<Sha256>>(password.as_bytes(), salt, iterations, &mut key)
        .map_err(|e| CryptoError::KeyDerivationFailed(e.to_string()))?;
    Ok(key)
}

/// Encrypt `plaintext` under `password`, using `iterations` PBKDF2 rounds
/// (must be >= [`MIN_PBKDF2_ITERATIONS`]).
pub fn encrypt(
    plaintext: &[u8],
    password: &str,
    iterations: u32,
) -> Result<EncryptedBlob, CryptoError> {
    if password.is_empty() {
        return Err(CryptoError::InvalidInput);
    }

    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);

    let nonce_arr = Aes256Gcm::generate_nonce(&mut OsRng);
    let mut nonce = [0u8; NONCE_LEN];
    nonce.copy_from_slice(&nonce_arr);

    let key = derive_key(password, &salt, iterations)?;
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    Ok(EncryptedBlob {
        salt,
        nonce,
        ciphertext,
        iterations,
    })
}

pub fn decrypt(blob: &EncryptedBlob, password: &str) -> Result<Vec<u8>, CryptoError> {
    if password.is_empty() {
        return Err(CryptoError::InvalidInput);
    }
    let key = derive_key(password, &blob.salt, blob.iterations)?;
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
    cipher
        .decrypt(Nonce::from_slice(&blob.nonce), blob.ciphertext.as_slice())
        .map_err(|_| CryptoError::DecryptionAuthFail)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ITERS: u32 = MIN_PBKDF2_ITERATIONS;

    #[test]
    fn roundtrip() {
        let pt = b"switch payload secret";
        let blob = encrypt(pt, "correct horse battery staple", ITERS).unwrap();
        let recovered = decrypt(&blob, "correct horse battery staple").unwrap();
        assert_eq!(recovered, pt);
    }

    #[test]
    fn wrong_password_fails() {
        let blob = encrypt(b"data", "right", ITERS).unwrap();
        assert!(decrypt(&blob, "wrong").is_err());
    }

    #[test]
    fn empty_password_rejected() {
        assert!(matches!(
            encrypt(b"data", "", ITERS),
            Err(CryptoError::InvalidInput)
        ));
        let blob = encrypt(b"data", "x", ITERS).unwrap();
        assert!(matches!(
            decrypt(&blob, ""),
            Err(CryptoError::InvalidInput)
        ));
    }

    #[test]
    fn below_minimum_iterations_rejected() {
        assert!(matches!(
            encrypt(b"data", "pw", 1000),
            Err(CryptoError::WeakIterations(1000))
        ));
    }

    #[test]
    fn different_encryptions_differ() {
        let a = encrypt(b"data", "pw", ITERS).unwrap();
        let b = encrypt(b"data", "pw", ITERS).unwrap();
        assert_ne!(a.to_bytes(), b.to_bytes());
        assert_eq!(decrypt(&a, "pw").unwrap(), decrypt(&b, "pw").unwrap());
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let mut blob = encrypt(b"data", "pw", ITERS).unwrap();
        let last = blob.ciphertext.len() - 1;
        blob.ciphertext[last] ^= 0xFF;
        assert!(decrypt(&blob, "pw").is_err());
    }

    #[test]
    fn serialization_roundtrip() {
        let blob = encrypt(b"data", "pw", ITERS).unwrap();
        let bytes = blob.to_bytes();
        let restored = EncryptedBlob::from_bytes(&bytes).unwrap();
        assert_eq!(decrypt(&restored, "pw").unwrap(), b"data");
    }

    #[test]
    fn truncated_bytes_rejected() {
        assert!(matches!(
            EncryptedBlob::from_bytes(&[0u8; 4]),
            Err(CryptoError::InvalidFormat)
        ));
    }
}
