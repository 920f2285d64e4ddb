//! Orchestrates a switch's release across its two independent
//! publication surfaces: an optional Bitcoin timelock transaction and
//! the relay network.
//!
//! The two phases run strictly sequentially. Bitcoin goes first
//! because it's slow and final — once broadcast, EchoLock would
//! rather delay the relay publish than have the relay side commit
//! while the Bitcoin side is still unconfirmed and could still be
//! replaced or dropped. `allow_publish_without_bitcoin` exists for
//! switches that were never configured with a Bitcoin leg at all.

pub mod state;

pub use state::CommitState;

use bitcoin::Txid;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("cannot start phase 1 from state {0}")]
    InvalidPhase1Start(String),
    #[error("cannot complete phase 1 from state {0}")]
    InvalidPhase1Complete(String),
    #[error("cannot start phase 2 from state {0}")]
    InvalidPhase2Start(String),
    #[error("cannot complete phase 2 from state {0}")]
    InvalidPhase2Complete(String),
    #[error("cannot mark failure from terminal state {0}")]
    AlreadyTerminal(String),
    #[error("rollback is only valid from a failed state, found {0}")]
    RollbackRequiresFailure(String),
    #[error("bitcoin leg is required and was not skipped by policy")]
    BitcoinLegRequired,
}

/// Drives one switch's release through its commit phases.
pub struct Coordinator {
    state: CommitState,
    allow_publish_without_bitcoin: bool,
}

impl Coordinator {
    pub fn new(allow_publish_without_bitcoin: bool) -> Self {
        Self {
            state: CommitState::Pending,
            allow_publish_without_bitcoin,
        }
    }

    pub fn state(&self) -> &CommitState {
        &self.state
    }

    /// Begin phase 1: a Bitcoin timelock transaction has just been
    /// broadcast.
    pub fn begin_phase1_broadcast(&mut self, txid: Txid) -> Result<(), CoordinatorError> {
        match self.state {
            CommitState::Pending => {
                self.state = CommitState::Phase1Broadcasting { txid };
                log::info!("coordinator: phase 1 broadcasting {txid}");
                Ok(())
            }
            _ => Err(CoordinatorError::InvalidPhase1Start(self.state.to_string())),
        }
    }

    /// Phase 1's Bitcoin transaction reached the required confirmation
    /// depth.
    pub fn complete_phase1(&mut self) -> Result<(), CoordinatorError> {
        match &self.state {
            CommitState::Phase1Broadcasting { txid } => {
                let txid = *txid;
                self.state = CommitState::Phase1Confirmed { txid };
                log::info!("coordinator: phase 1 confirmed {txid}");
                Ok(())
            }
            other => Err(CoordinatorError::InvalidPhase1Complete(other.to_string())),
        }
    }

    /// Begin phase 2: publish the encrypted payload and shares to the
    /// relay network. Requires phase 1 to have confirmed, unless the
    /// switch has no Bitcoin leg at all and
    /// `allow_publish_without_bitcoin` was set.
    pub fn begin_phase2_publish(&mut self) -> Result<(), CoordinatorError> {
        match &self.state {
            CommitState::Phase1Confirmed { .. } => {
                self.state = CommitState::Phase2Publishing;
                log::info!("coordinator: phase 2 publishing");
                Ok(())
            }
            CommitState::Pending if self.allow_publish_without_bitcoin => {
                self.state = CommitState::Phase2Publishing;
                log::info!("coordinator: phase 2 publishing (no bitcoin leg)");
                Ok(())
            }
            CommitState::Pending => Err(CoordinatorError::BitcoinLegRequired),
            other => Err(CoordinatorError::InvalidPhase2Start(other.to_string())),
        }
    }

    /// Phase 2 finished: the relay network accepted the publish at or
    /// above the required acknowledgement threshold.
    pub fn complete_phase2(&mut self) -> Result<(), CoordinatorError> {
        match self.state {
            CommitState::Phase2Publishing => {
                self.state = CommitState::Committed;
                log::info!("coordinator: committed");
                Ok(())
            }
            ref other => Err(CoordinatorError::InvalidPhase2Complete(other.to_string())),
        }
    }

    /// Mark the commit as failed. Valid from any non-terminal state.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), CoordinatorError> {
        if self.state.is_terminal() {
            return Err(CoordinatorError::AlreadyTerminal(self.state.to_string()));
        }
        let bitcoin_txid = match &self.state {
            CommitState::Phase1Broadcasting { txid } | CommitState::Phase1Confirmed { txid } => {
                Some(*txid)
            }
            _ => None,
        };
        let reason = reason.into();
        log::warn!("coordinator: commit failed: {reason}");
        self.state = CommitState::Failed {
            reason,
            bitcoin_txid,
        };
        Ok(())
    }

    /// Roll back a failed commit. Only valid from [`CommitState::Failed`]
    /// — a committed or already-rolled-back switch cannot be re-entered.
    pub fn rollback(&mut self) -> Result<(), CoordinatorError> {
        if !self.state.is_failed() {
            return Err(CoordinatorError::RollbackRequiresFailure(
                self.state.to_string(),
            ));
        }
        self.state = CommitState::RolledBack;
        log::info!("coordinator: rolled back");
        Ok(())
    }
}
