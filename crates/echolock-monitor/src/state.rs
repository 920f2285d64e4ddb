//! Confirmation state machine for a single broadcast transaction.

use bitcoin::Txid;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Where a broadcast transaction sits in its confirmation lifecycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConfirmationState {
    /// Handed to `broadcast()`, not yet observed by the chain.
    Broadcast,
    /// Seen in the esplora mempool but not yet in a block.
    InMempool,
    /// Included in a block; carries the running confirmation count.
    Confirming(u32),
    /// Reached the required confirmation depth.
    Confirmed,
    /// Disappeared from both mempool and chain across consecutive polls.
    Dropped,
    /// Never confirmed within the configured maximum wait.
    TimedOut,
}

impl ConfirmationState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ConfirmationState::Confirmed
                | ConfirmationState::Dropped
                | ConfirmationState::TimedOut
        )
    }
}

/// Tracked state for one broadcast transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxMonitorState {
    pub txid: Txid,
    pub state: ConfirmationState,
    pub first_seen_at: u64,
    pub last_polled_at: u64,
    /// Consecutive polls in which the tx was absent from both mempool
    /// and chain. Two in a row means it was dropped from the mempool,
    /// but only once `ever_seen_in_mempool` is true — a broadcast that
    /// simply hasn't propagated yet is not a drop.
    pub absent_polls: u32,
    /// Set the first time this tx is observed in the mempool or chain.
    /// Drop detection only applies after this, so an esplora lookup
    /// that hasn't indexed the broadcast yet can't be mistaken for one.
    pub ever_seen_in_mempool: bool,
    pub confirmed_height: Option<u32>,
}

impl TxMonitorState {
    pub fn new(txid: Txid) -> Self {
        let now = current_timestamp();
        Self {
            txid,
            state: ConfirmationState::Broadcast,
            first_seen_at: now,
            last_polled_at: now,
            absent_polls: 0,
            ever_seen_in_mempool: false,
            confirmed_height: None,
        }
    }

    pub fn elapsed_secs(&self) -> u64 {
        current_timestamp().saturating_sub(self.first_seen_at)
    }
}

pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_are_flagged_correctly() {
        assert!(!ConfirmationState::Broadcast.is_terminal());
        assert!(!ConfirmationState::InMempool.is_terminal());
        assert!(!ConfirmationState::Confirming(2).is_terminal());
        assert!(ConfirmationState::Confirmed.is_terminal());
        assert!(ConfirmationState::Dropped.is_terminal());
        assert!(ConfirmationState::TimedOut.is_terminal());
    }

    #[test]
    fn new_state_starts_at_broadcast_with_zero_absences() {
        let txid = Txid::from_slice(&[0u8; 32]).unwrap();
        let state = TxMonitorState::new(txid);
        assert_eq!(state.state, ConfirmationState::Broadcast);
        assert_eq!(state.absent_polls, 0);
        assert!(!state.ever_seen_in_mempool);
        assert!(state.confirmed_height.is_none());
    }
}
