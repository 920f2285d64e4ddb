//! Cryptographic primitives shared by every EchoLock crate:
//! password-based authenticated encryption, memory hardening, and
//! password strength estimation.

pub mod cipher;
pub mod memory;
pub mod password;

pub use cipher::{decrypt, encrypt, CryptoError, EncryptedBlob, MIN_PBKDF2_ITERATIONS};
pub use memory::{disable_core_dumps, with_locked_scope, LockedBuffer};
