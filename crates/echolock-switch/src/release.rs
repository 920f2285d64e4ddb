//! Recovers a switch's plaintext message at release time.
//!
//! Release needs a password supplied from outside the daemon — there
//! is no way to derive it from anything the daemon persists, since
//! that would defeat the point of a password-wrapped secret. The
//! caller (an operator or a custodian driving `--release`) supplies
//! it; this module only verifies it's the right one and does the
//! actual decryption.
//!
//! `combine_shares` is called here purely as a threshold-and-authenticity
//! gate: fewer than `threshold_required` shares, or any share that
//! fails its MAC, aborts release before `encrypted_message` is ever
//! touched. The Shamir-reconstructed bytes themselves are discarded —
//! the message is decrypted directly from `encrypted_message` under
//! the supplied password instead.

use crate::model::Switch;
use echolock_crypto::cipher::CryptoError;
use echolock_payload::PayloadError;
use echolock_shamir::{combine_shares, AuthenticatedShare, ShamirError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReleaseError {
    #[error("switch has no encrypted message to recover")]
    NoEncryptedMessage,
    #[error("switch has no wrapped auth key to verify shares against")]
    NoAuthKey,
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Shamir(#[from] ShamirError),
    #[error(transparent)]
    Payload(#[from] PayloadError),
}

/// Recover the plaintext message behind `switch`, given the release
/// password and at least `threshold_required` fetched shares.
pub fn recover_message(
    switch: &Switch,
    password: &str,
    shares: &[AuthenticatedShare],
) -> Result<Vec<u8>, ReleaseError> {
    let auth_key_wrapped = switch
        .auth_key_wrapped
        .as_ref()
        .ok_or(ReleaseError::NoAuthKey)?;
    let encrypted_message = switch
        .encrypted_message
        .as_ref()
        .ok_or(ReleaseError::NoEncryptedMessage)?;

    let threshold = switch.threshold_required as u8;
    auth_key_wrapped.with_unwrapped(password, |auth_key_bytes| {
        let auth_key: [u8; echolock_shamir::authenticated::AUTH_KEY_LEN] =
            auth_key_bytes.try_into().map_err(|_| {
                ShamirError::InvalidShare("wrapped auth key has the wrong length".into())
            })?;
        combine_shares(shares, &auth_key, threshold)?;
        Ok::<(), ShamirError>(())
    })??;

    let plaintext = encrypted_message.open(password)?;
    Ok(plaintext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::creation::prepare_switch;
    use echolock_crypto::cipher::MIN_PBKDF2_ITERATIONS;

    fn committed() -> (Switch, Vec<AuthenticatedShare>) {
        let prepared = prepare_switch(
            "sw-1",
            "alice",
            3,
            5,
            86_400,
            vec!["wss://relay.example".into()],
            vec!["alice@example.com".into()],
            b"hello world",
            "correct horse battery staple",
            MIN_PBKDF2_ITERATIONS,
        )
        .unwrap();
        (prepared.switch, prepared.shares)
    }

    #[test]
    fn recovers_plaintext_with_enough_correct_shares() {
        let (switch, shares) = committed();
        let recovered = recover_message(
            &switch,
            "correct horse battery staple",
            &shares[0..3],
        )
        .unwrap();
        assert_eq!(recovered, b"hello world");
    }

    #[test]
    fn wrong_password_fails_before_decrypt() {
        let (switch, shares) = committed();
        let result = recover_message(&switch, "wrong password entirely", &shares[0..3]);
        assert!(matches!(result, Err(ReleaseError::Crypto(_))));
    }

    #[test]
    fn insufficient_shares_rejected() {
        let (switch, shares) = committed();
        let result = recover_message(
            &switch,
            "correct horse battery staple",
            &shares[0..2],
        );
        assert!(matches!(
            result,
            Err(ReleaseError::Shamir(ShamirError::InsufficientShares))
        ));
    }

    #[test]
    fn tampered_share_rejected() {
        let (switch, shares) = committed();
        let mut shares = shares[0..3].to_vec();
        shares[0].data[0] ^= 0x01;
        let result = recover_message(&switch, "correct horse battery staple", &shares);
        assert!(matches!(
            result,
            Err(ReleaseError::Shamir(ShamirError::ShareInvalid(_)))
        ));
    }

    #[test]
    fn missing_encrypted_message_rejected() {
        let (mut switch, shares) = committed();
        switch.encrypted_message = None;
        let result = recover_message(&switch, "correct horse battery staple", &shares[0..3]);
        assert!(matches!(result, Err(ReleaseError::NoEncryptedMessage)));
    }
}
