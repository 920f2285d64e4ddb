//! The atomic fragment payload — the versioned envelope that binds
//! ciphertext, IV, authentication tag, KDF salt and iteration count,
//! and an integrity hash into one self-describing unit. This is the
//! thing that actually gets split into Shamir shares and published to
//! relays, never the raw encrypted bytes alone.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use echolock_crypto::cipher::{derive_key, KEY_LEN, MIN_PBKDF2_ITERATIONS, NONCE_LEN, SALT_LEN};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub const CURRENT_VERSION: u8 = 1;
pub const TAG_LEN: usize = 16;
pub const INTEGRITY_LEN: usize = 32;

#[derive(Error, Debug)]
pub enum PayloadError {
    #[error("unsupported atomic payload version: {0}")]
    UnsupportedVersion(u8),
    #[error("atomic payload integrity hash mismatch")]
    IntegrityMismatch,
    #[error("malformed atomic payload: {0}")]
    Malformed(String),
    #[error(transparent)]
    Crypto(#[from] echolock_crypto::cipher::CryptoError),
}

/// The versioned, integrity-checked unit of data EchoLock splits and
/// distributes. Every field participates in the integrity hash, so any
/// bit flip anywhere in the envelope is detected at `open()` time
/// rather than surfacing as a confusing AES-GCM auth failure deep in
/// the decrypt path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AtomicPayload {
    pub version: u8,
    pub iterations: u32,
    pub salt: [u8; SALT_LEN],
    pub iv: [u8; NONCE_LEN],
    pub tag: [u8; TAG_LEN],
    pub ciphertext: Vec<u8>,
    pub integrity_hash: [u8; INTEGRITY_LEN],
}

impl AtomicPayload {
    /// Encrypt `plaintext` under `password` and bind the result into a
    /// fresh, integrity-hashed envelope.
    pub fn seal(
        plaintext: &[u8],
        password: &str,
        iterations: u32,
    ) -> Result<Self, PayloadError> {
        if iterations < MIN_PBKDF2_ITERATIONS {
            return Err(echolock_crypto::cipher::CryptoError::WeakIterations(iterations).into());
        }

        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let nonce_arr = Aes256Gcm::generate_nonce(&mut OsRng);
        let mut iv = [0u8; NONCE_LEN];
        iv.copy_from_slice(&nonce_arr);

        let key = derive_key(password, &salt, iterations)?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
        let combined = cipher
            .encrypt(Nonce::from_slice(&iv), plaintext)
            .map_err(|e| {
                echolock_crypto::cipher::CryptoError::EncryptionFailed(e.to_string())
            })?;

        // aes-gcm appends the 16-byte tag to the ciphertext; split them
        // apart so they travel as distinct envelope fields.
        let split_at = combined.len() - TAG_LEN;
        let ciphertext = combined[..split_at].to_vec();
        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&combined[split_at..]);

        let integrity_hash = compute_integrity_hash(
            CURRENT_VERSION,
            iterations,
            &salt,
            &iv,
            &tag,
            &ciphertext,
        );

        Ok(Self {
            version: CURRENT_VERSION,
            iterations,
            salt,
            iv,
            tag,
            ciphertext,
            integrity_hash,
        })
    }

    /// Verify the integrity hash, then decrypt under `password`.
    pub fn open(&self, password: &str) -> Result<Vec<u8>, PayloadError> {
        if self.version != CURRENT_VERSION {
            return Err(PayloadError::UnsupportedVersion(self.version));
        }

        let expected = compute_integrity_hash(
            self.version,
            self.iterations,
            &self.salt,
            &self.iv,
            &self.tag,
            &self.ciphertext,
        );
        if !constant_time_eq(&expected, &self.integrity_hash) {
            return Err(PayloadError::IntegrityMismatch);
        }

        let key = derive_key(password, &self.salt, self.iterations)?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
        let mut combined = self.ciphertext.clone();
        combined.extend_from_slice(&self.tag);
        cipher
            .decrypt(Nonce::from_slice(&self.iv), combined.as_slice())
            .map_err(|_| echolock_crypto::cipher::CryptoError::DecryptionAuthFail.into())
    }

    /// Canonical big-endian wire form:
    /// version(1) || iterations(4) || salt(32) || iv(12) || tag(16) ||
    /// ciphertext_len(4) || ciphertext || integrity_hash(32)
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            1 + 4 + SALT_LEN + NONCE_LEN + TAG_LEN + 4 + self.ciphertext.len() + INTEGRITY_LEN,
        );
        out.push(self.version);
        out.extend_from_slice(&self.iterations.to_be_bytes());
        out.extend_from_slice(&self.salt);
        out.extend_from_slice(&self.iv);
        out.extend_from_slice(&self.tag);
        out.extend_from_slice(&(self.ciphertext.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.ciphertext);
        out.extend_from_slice(&self.integrity_hash);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PayloadError> {
        let fixed_header = 1 + 4 + SALT_LEN + NONCE_LEN + TAG_LEN + 4;
        if bytes.len() < fixed_header + INTEGRITY_LEN {
            return Err(PayloadError::Malformed("buffer too short".into()));
        }

        let version = bytes[0];
        if version != CURRENT_VERSION {
            return Err(PayloadError::UnsupportedVersion(version));
        }

        let mut cursor = 1;
        let iterations = u32::from_be_bytes(bytes[cursor..cursor + 4].try_into().unwrap());
        cursor += 4;

        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&bytes[cursor..cursor + SALT_LEN]);
        cursor += SALT_LEN;

        let mut iv = [0u8; NONCE_LEN];
        iv.copy_from_slice(&bytes[cursor..cursor + NONCE_LEN]);
        cursor += NONCE_LEN;

        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&bytes[cursor..cursor + TAG_LEN]);
        cursor += TAG_LEN;

        let ct_len = u32::from_be_bytes(bytes[cursor..cursor + 4].try_into().unwrap()) as usize;
        cursor += 4;

        if bytes.len() != cursor + ct_len + INTEGRITY_LEN {
            return Err(PayloadError::Malformed(
                "declared ciphertext length doesn't match buffer size".into(),
            ));
        }
        let ciphertext = bytes[cursor..cursor + ct_len].to_vec();
        cursor += ct_len;

        let mut integrity_hash = [0u8; INTEGRITY_LEN];
        integrity_hash.copy_from_slice(&bytes[cursor..cursor + INTEGRITY_LEN]);

        Ok(Self {
            version,
            iterations,
            salt,
            iv,
            tag,
            ciphertext,
            integrity_hash,
        })
    }
}

fn compute_integrity_hash(
    version: u8,
    iterations: u32,
    salt: &[u8; SALT_LEN],
    iv: &[u8; NONCE_LEN],
    tag: &[u8; TAG_LEN],
    ciphertext: &[u8],
) -> [u8; INTEGRITY_LEN] {
    let mut hasher = Sha256::new();
    hasher.update([version]);
    hasher.update(ciphertext);
    hasher.update(iv);
    hasher.update(tag);
    hasher.update(salt);
    hasher.update(iterations.to_be_bytes());
    let digest = hasher.finalize();
    let mut out = [0u8; INTEGRITY_LEN];
    out.copy_from_slice(&digest);
    out
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

// Silence an unused-import warning on platforms where KEY_LEN isn't
// referenced directly; kept for documentation of the envelope's key size.
const _: usize = KEY_LEN;

#[cfg(test)]
mod tests {
    use super::*;

    const ITERS: u32 = MIN_PBKDF2_ITERATIONS;

    #[test]
    fn seal_and_open_roundtrip() {
        let payload = AtomicPayload::seal(b"switch secret bytes", "pw", ITERS).unwrap();
        let opened = payload.open("pw").unwrap();
        assert_eq!(opened, b"switch secret bytes");
    }

    #[test]
    fn wrong_password_fails_open() {
        let payload = AtomicPayload::seal(b"data", "right", ITERS).unwrap();
        assert!(payload.open("wrong").is_err());
    }

    #[test]
    fn wire_roundtrip_preserves_fields() {
        let payload = AtomicPayload::seal(b"data", "pw", ITERS).unwrap();
        let bytes = payload.to_bytes();
        let restored = AtomicPayload::from_bytes(&bytes).unwrap();
        assert_eq!(payload, restored);
        assert_eq!(restored.open("pw").unwrap(), b"data");
    }

    #[test]
    fn tampered_integrity_hash_detected_before_decrypt() {
        let mut payload = AtomicPayload::seal(b"data", "pw", ITERS).unwrap();
        payload.integrity_hash[0] ^= 0xFF;
        assert!(matches!(
            payload.open("pw"),
            Err(PayloadError::IntegrityMismatch)
        ));
    }

    #[test]
    fn tampered_ciphertext_detected_by_integrity_hash_first() {
        let mut payload = AtomicPayload::seal(b"data", "pw", ITERS).unwrap();
        payload.ciphertext[0] ^= 0xFF;
        // The integrity hash covers the ciphertext, so this is caught
        // before AES-GCM ever runs.
        assert!(matches!(
            payload.open("pw"),
            Err(PayloadError::IntegrityMismatch)
        ));
    }

    #[test]
    fn unsupported_version_rejected() {
        let mut payload = AtomicPayload::seal(b"data", "pw", ITERS).unwrap();
        payload.version = 99;
        assert!(matches!(
            payload.open("pw"),
            Err(PayloadError::UnsupportedVersion(99))
        ));

        let mut bytes = payload.to_bytes();
        bytes[0] = 99;
        assert!(matches!(
            AtomicPayload::from_bytes(&bytes),
            Err(PayloadError::UnsupportedVersion(99))
        ));
    }

    #[test]
    fn truncated_buffer_rejected() {
        let payload = AtomicPayload::seal(b"data", "pw", ITERS).unwrap();
        let bytes = payload.to_bytes();
        assert!(AtomicPayload::from_bytes(&bytes[..bytes.len() - 1]).is_err());
    }
}
