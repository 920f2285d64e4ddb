//! Events emitted by the monitor service as confirmation state changes.

use crate::state::ConfirmationState;
use bitcoin::Txid;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum MonitorEvent {
    /// Transaction moved from one confirmation state to another.
    StatusChanged {
        txid: Txid,
        from: ConfirmationState,
        to: ConfirmationState,
    },
    /// Reached the required confirmation depth.
    Confirmed { txid: Txid, height: u32 },
    /// Absent from both mempool and chain for two consecutive polls.
    Dropped { txid: Txid },
    /// Exceeded the maximum wait without confirming.
    TimedOut { txid: Txid },
    /// A poll attempt itself failed (network issue, esplora error).
    PollError { txid: Txid, message: String },
}

impl MonitorEvent {
    pub fn txid(&self) -> Txid {
        match self {
            MonitorEvent::StatusChanged { txid, .. } => *txid,
            MonitorEvent::Confirmed { txid, .. } => *txid,
            MonitorEvent::Dropped { txid } => *txid,
            MonitorEvent::TimedOut { txid } => *txid,
            MonitorEvent::PollError { txid, .. } => *txid,
        }
    }
}
