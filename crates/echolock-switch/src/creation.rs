//! Assembles a [`Switch`]'s commit material: seals the message, splits
//! the derived auth key, and wraps it — everything the daemon needs
//! before it can drive a two-phase commit and call [`Switch::arm`].
//!
//! This module does no I/O of its own. It hands back a [`PreparedSwitch`]
//! holding a `Pending` switch plus the shares that still need to be
//! published; the caller owns broadcasting to Bitcoin and relays.

use crate::model::{ShareMeta, Switch, SwitchError};
use echolock_crypto::cipher::CryptoError;
use echolock_payload::{AtomicPayload, PayloadError};
use echolock_shamir::{split_secret, AuthenticatedShare, ShamirError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CreationError {
    #[error(transparent)]
    Switch(#[from] SwitchError),
    #[error(transparent)]
    Payload(#[from] PayloadError),
    #[error(transparent)]
    Shamir(#[from] ShamirError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// A switch assembled but not yet committed, plus the shares that need
/// publishing before [`Switch::arm`] can be called.
pub struct PreparedSwitch {
    pub switch: Switch,
    pub shares: Vec<AuthenticatedShare>,
}

/// Seal `plaintext`, split the Shamir auth key, and build a `Pending`
/// switch carrying the encrypted message and wrapped auth key. The
/// same `password` both seals the message and wraps the auth key, so a
/// single secret unlocks the whole commit at release time.
#[allow(clippy::too_many_arguments)]
pub fn prepare_switch(
    id: impl Into<String>,
    owner_label: impl Into<String>,
    threshold_required: u32,
    threshold_total: u32,
    check_in_interval_secs: u64,
    relay_urls: Vec<String>,
    recipients: Vec<String>,
    plaintext: &[u8],
    password: &str,
    iterations: u32,
) -> Result<PreparedSwitch, CreationError> {
    let mut switch = Switch::new(
        id,
        owner_label,
        threshold_required,
        threshold_total,
        check_in_interval_secs,
        relay_urls.clone(),
        recipients,
    )?;

    let encrypted_message = AtomicPayload::seal(plaintext, password, iterations)?;

    let split = split_secret(
        password.as_bytes(),
        threshold_required as u8,
        threshold_total as u8,
    )?;

    let auth_key_wrapped =
        crate::wrapped_key::WrappedPrivateKey::wrap(&split.auth_key, password, iterations)?;

    let shares_meta = split
        .shares
        .iter()
        .map(|share| ShareMeta {
            index: share.index,
            relay_set: relay_urls.clone(),
            event_id: None,
        })
        .collect();

    switch.encrypted_message = Some(encrypted_message);
    switch.shares_meta = shares_meta;
    switch.auth_key_wrapped = Some(auth_key_wrapped);

    Ok(PreparedSwitch {
        switch,
        shares: split.shares,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use echolock_crypto::cipher::MIN_PBKDF2_ITERATIONS;

    #[test]
    fn prepares_a_pending_switch_with_commit_material() {
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

        assert_eq!(prepared.switch.state, crate::model::SwitchState::Pending);
        assert!(prepared.switch.encrypted_message.is_some());
        assert!(prepared.switch.auth_key_wrapped.is_some());
        assert_eq!(prepared.switch.shares_meta.len(), 5);
        assert_eq!(prepared.shares.len(), 5);
    }

    #[test]
    fn prepared_switch_arms_once_shares_meta_carries_event_ids() {
        let mut prepared = prepare_switch(
            "sw-2",
            "alice",
            2,
            3,
            3_600,
            vec!["wss://relay.example".into()],
            vec![],
            b"secret",
            "pw",
            MIN_PBKDF2_ITERATIONS,
        )
        .unwrap();

        for meta in prepared.switch.shares_meta.iter_mut() {
            meta.event_id = Some(format!("event-{}", meta.index));
        }
        prepared.switch.arm().unwrap();
        assert_eq!(prepared.switch.state, crate::model::SwitchState::Armed);
    }

    #[test]
    fn rejects_invalid_threshold_before_sealing_anything() {
        let result = prepare_switch(
            "sw-3",
            "alice",
            0,
            3,
            3_600,
            vec![],
            vec![],
            b"secret",
            "pw",
            MIN_PBKDF2_ITERATIONS,
        );
        assert!(matches!(result, Err(CreationError::Switch(_))));
    }
}
