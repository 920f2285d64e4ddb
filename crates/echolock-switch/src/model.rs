//! The switch data model and its check-in-driven state machine.
//!
//! Unlike the CSV-based check-in in a UTXO inheritance vault, a
//! switch's check-in clock is driven purely by wall-clock time: the
//! owner calls [`Switch::check_in`] periodically, and
//! [`Switch::evaluate`] (called by the daemon's poll loop) trips the
//! switch to `Triggered` once the configured interval has elapsed
//! since the last check-in.
//!
//! A switch starts life `Pending`: [`Switch::new`] only fixes its
//! identity and threshold shape. The encrypted message, per-share
//! metadata, and wrapped auth key are filled in by the creation
//! pipeline, and [`Switch::arm`] only succeeds once all three are
//! present and the caller's two-phase commit has actually finished —
//! a switch never becomes `Armed` on the strength of local state
//! alone.

use crate::wrapped_key::WrappedPrivateKey;
use echolock_payload::AtomicPayload;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SwitchError {
    #[error("switch is not armed (state {0:?}) and cannot be checked in")]
    NotArmed(SwitchState),
    #[error("cannot cancel a switch in terminal state {0:?}")]
    AlreadyTerminal(SwitchState),
    #[error("release is only valid from Triggered, found {0:?}")]
    NotTriggered(SwitchState),
    #[error("arm is only valid from Pending, found {0:?}")]
    NotPending(SwitchState),
    #[error("cannot arm: encrypted_message, shares_meta, and auth_key_wrapped must all be set first")]
    IncompleteCommit,
    #[error("threshold_required ({required}) must be >= 1 and <= threshold_total ({total})")]
    InvalidThreshold { required: u32, total: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwitchState {
    /// Assembled locally but not yet committed to Bitcoin/relays.
    Pending,
    /// Committed and waiting on check-ins.
    Armed,
    /// Check-in interval elapsed; release is underway.
    Triggered,
    /// Release committed — payload and shares are public.
    Released,
    /// Owner cancelled before triggering.
    Cancelled,
}

impl SwitchState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SwitchState::Released | SwitchState::Cancelled)
    }
}

/// A single check-in event, kept in an append-only history so a
/// switch's full check-in record survives restarts and disputes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckinRecord {
    pub at: u64,
    pub note: Option<String>,
}

/// Where one Shamir share lives, without the share bytes themselves —
/// those are published to relays and never persisted in the switch
/// record, so a stolen store backup leaks no decryption material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareMeta {
    pub index: u8,
    pub relay_set: Vec<String>,
    pub event_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Switch {
    pub id: String,
    pub owner_label: String,
    pub threshold_required: u32,
    pub threshold_total: u32,
    pub check_in_interval_secs: u64,
    pub created_at: u64,
    pub last_checkin_at: u64,
    pub state: SwitchState,
    pub history: Vec<CheckinRecord>,
    /// The sealed message envelope. Safe to persist locally — every
    /// field is either ciphertext or a KDF parameter, never a key.
    pub encrypted_message: Option<AtomicPayload>,
    /// Per-share location metadata, populated once shares are
    /// published. Never carries share bytes.
    pub shares_meta: Vec<ShareMeta>,
    /// Delivery addresses the release pipeline notifies on release.
    pub recipients: Vec<String>,
    /// The Shamir auth key used to verify shares at combine time,
    /// wrapped under the same password that sealed `encrypted_message`.
    pub auth_key_wrapped: Option<WrappedPrivateKey>,
    /// Opaque wrapped key for the optional Bitcoin claim path. `None`
    /// for switches with no Bitcoin leg.
    pub wrapped_bitcoin_key: Option<WrappedPrivateKey>,
    /// Height at which the Bitcoin CLTV output becomes spendable, if
    /// this switch has a Bitcoin leg.
    pub bitcoin_locktime_height: Option<u32>,
    /// Txid of the confirmed funding commitment that pays into the
    /// P2SH timelock address. Set once the creation-time coordinator's
    /// Bitcoin phase confirms — distinct from the eventual spend.
    pub bitcoin_txid: Option<String>,
    /// The fully signed CLTV-spending transaction, hex-encoded and
    /// ready to broadcast once triggered. Pre-signing at creation time
    /// means the daemon never needs to touch the unwrapped private key
    /// again — broadcasting is the only action release requires.
    pub bitcoin_signed_tx_hex: Option<String>,
    pub relay_urls: Vec<String>,
}

impl Switch {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        owner_label: impl Into<String>,
        threshold_required: u32,
        threshold_total: u32,
        check_in_interval_secs: u64,
        relay_urls: Vec<String>,
        recipients: Vec<String>,
    ) -> Result<Self, SwitchError> {
        if threshold_required == 0 || threshold_required > threshold_total {
            return Err(SwitchError::InvalidThreshold {
                required: threshold_required,
                total: threshold_total,
            });
        }
        let now = current_timestamp();
        Ok(Self {
            id: id.into(),
            owner_label: owner_label.into(),
            threshold_required,
            threshold_total,
            check_in_interval_secs,
            created_at: now,
            last_checkin_at: now,
            state: SwitchState::Pending,
            history: Vec::new(),
            encrypted_message: None,
            shares_meta: Vec::new(),
            recipients,
            auth_key_wrapped: None,
            wrapped_bitcoin_key: None,
            bitcoin_locktime_height: None,
            bitcoin_txid: None,
            bitcoin_signed_tx_hex: None,
            relay_urls,
        })
    }

    /// Attach a pre-signed Bitcoin CLTV leg. `signed_tx_hex` must
    /// already be fully signed — the daemon broadcasts it verbatim
    /// once the switch triggers.
    pub fn attach_bitcoin_leg(
        &mut self,
        wrapped_key: WrappedPrivateKey,
        locktime_height: u32,
        signed_tx_hex: impl Into<String>,
    ) {
        self.wrapped_bitcoin_key = Some(wrapped_key);
        self.bitcoin_locktime_height = Some(locktime_height);
        self.bitcoin_signed_tx_hex = Some(signed_tx_hex.into());
    }

    /// Commit the switch: valid only from `Pending`, and only once the
    /// encrypted message, share metadata, and wrapped auth key are all
    /// in place. Callers invoke this after their two-phase commit
    /// (Bitcoin leg, then relay publish) has actually succeeded —
    /// `arm` itself performs no I/O and trusts the caller on that.
    pub fn arm(&mut self) -> Result<(), SwitchError> {
        if self.state != SwitchState::Pending {
            return Err(SwitchError::NotPending(self.state));
        }
        if self.encrypted_message.is_none()
            || self.shares_meta.is_empty()
            || self.auth_key_wrapped.is_none()
        {
            return Err(SwitchError::IncompleteCommit);
        }
        self.state = SwitchState::Armed;
        self.last_checkin_at = current_timestamp();
        log::info!("switch {}: armed", self.id);
        Ok(())
    }

    /// Record a check-in, resetting the clock. Valid only from `Armed`.
    pub fn check_in(&mut self, note: Option<String>) -> Result<(), SwitchError> {
        if self.state != SwitchState::Armed {
            return Err(SwitchError::NotArmed(self.state));
        }
        let now = current_timestamp();
        self.last_checkin_at = now;
        self.history.push(CheckinRecord { at: now, note });
        log::info!("switch {}: check-in recorded", self.id);
        Ok(())
    }

    /// Re-evaluate the switch against the current time, tripping it to
    /// `Triggered` if the check-in interval has elapsed. Pure given
    /// `now`; the caller (daemon poll loop) supplies it.
    pub fn evaluate(&mut self, now: u64) {
        if self.state != SwitchState::Armed {
            return;
        }
        let elapsed = now.saturating_sub(self.last_checkin_at);
        if elapsed >= self.check_in_interval_secs {
            log::warn!(
                "switch {}: check-in interval elapsed ({}s >= {}s), triggering",
                self.id,
                elapsed,
                self.check_in_interval_secs
            );
            self.state = SwitchState::Triggered;
        }
    }

    /// Cancel the switch. Valid from any non-terminal state.
    pub fn cancel(&mut self) -> Result<(), SwitchError> {
        if self.state.is_terminal() {
            return Err(SwitchError::AlreadyTerminal(self.state));
        }
        self.state = SwitchState::Cancelled;
        log::info!("switch {}: cancelled", self.id);
        Ok(())
    }

    /// Mark the switch released, once the release pipeline has
    /// recovered and delivered the message. Valid only from
    /// `Triggered`.
    pub fn release(&mut self) -> Result<(), SwitchError> {
        if self.state != SwitchState::Triggered {
            return Err(SwitchError::NotTriggered(self.state));
        }
        self.state = SwitchState::Released;
        log::info!("switch {}: released", self.id);
        Ok(())
    }

    pub fn seconds_until_trigger(&self, now: u64) -> i64 {
        let deadline = self.last_checkin_at + self.check_in_interval_secs;
        deadline as i64 - now as i64
    }
}

pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
