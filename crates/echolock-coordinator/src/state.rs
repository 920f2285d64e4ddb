//! Commit state machine for a switch's release.
//!
//! Release is two-phase: the Bitcoin timelock output (if configured)
//! must broadcast and confirm before the relay network publishes the
//! encrypted payload and shares. The phases run strictly in that order
//! — never concurrently — so a relay publish can never race ahead of
//! a Bitcoin broadcast that later fails to confirm.

use bitcoin::Txid;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CommitState {
    /// Nothing has started yet.
    Pending,
    /// Bitcoin timelock transaction has been broadcast, not yet confirmed.
    Phase1Broadcasting { txid: Txid },
    /// Bitcoin transaction reached the required confirmation depth.
    Phase1Confirmed { txid: Txid },
    /// Relay network publish is underway.
    Phase2Publishing,
    /// Both phases completed; the switch has released.
    Committed,
    /// A phase failed. `bitcoin_txid` is set if the failure occurred
    /// after a Bitcoin broadcast was made.
    Failed {
        reason: String,
        bitcoin_txid: Option<Txid>,
    },
    /// A failed commit was explicitly rolled back.
    RolledBack,
}

impl CommitState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CommitState::Committed | CommitState::RolledBack)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, CommitState::Failed { .. })
    }
}

impl fmt::Display for CommitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommitState::Pending => write!(f, "pending"),
            CommitState::Phase1Broadcasting { txid } => {
                write!(f, "phase1-broadcasting({txid})")
            }
            CommitState::Phase1Confirmed { txid } => write!(f, "phase1-confirmed({txid})"),
            CommitState::Phase2Publishing => write!(f, "phase2-publishing"),
            CommitState::Committed => write!(f, "committed"),
            CommitState::Failed {
                reason,
                bitcoin_txid,
            } => match bitcoin_txid {
                Some(txid) => write!(f, "failed({reason}, btc={txid})"),
                None => write!(f, "failed({reason})"),
            },
            CommitState::RolledBack => write!(f, "rolled-back"),
        }
    }
}
