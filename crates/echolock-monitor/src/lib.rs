//! Confirmation tracking for Bitcoin transactions broadcast by
//! EchoLock's timelock path.
//!
//! A broadcast txid moves through `Broadcast -> InMempool ->
//! Confirming(n) -> Confirmed`, or drops out to `Dropped` if it
//! disappears from both mempool and chain across two consecutive
//! polls, or to `TimedOut` if it never confirms within the configured
//! maximum wait.

pub mod events;
pub mod retry;
pub mod state;

pub use events::MonitorEvent;
pub use retry::broadcast_with_retry;
pub use state::{ConfirmationState, TxMonitorState};

use bitcoin::Txid;
use echolock_bitcoin::EsploraClient;
use std::collections::HashMap;
use std::time::Duration;

/// Default polling cadence.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
/// Default ceiling on how long an unconfirmed broadcast is tracked
/// before it's reported as timed out.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub poll_interval: Duration,
    pub max_wait: Duration,
    pub required_confirmations: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_wait: DEFAULT_MAX_WAIT,
            required_confirmations: 1,
        }
    }
}

/// Tracks the confirmation lifecycle of broadcast transactions.
pub struct MonitorService {
    config: MonitorConfig,
    tracked: HashMap<Txid, TxMonitorState>,
}

impl MonitorService {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            tracked: HashMap::new(),
        }
    }

    /// Begin tracking a freshly broadcast transaction.
    pub fn track(&mut self, txid: Txid) {
        self.tracked
            .entry(txid)
            .or_insert_with(|| TxMonitorState::new(txid));
    }

    pub fn state_of(&self, txid: &Txid) -> Option<&TxMonitorState> {
        self.tracked.get(txid)
    }

    /// Stop tracking a transaction (it reached a terminal state and
    /// the caller has consumed the event).
    pub fn untrack(&mut self, txid: &Txid) {
        self.tracked.remove(txid);
    }

    /// Poll every tracked, non-terminal transaction once against
    /// `client`, updating state and returning the events produced.
    pub async fn poll(&mut self, client: &EsploraClient) -> Vec<MonitorEvent> {
        let tip = match client.get_tip_height().await {
            Ok(h) => h,
            Err(e) => {
                return self
                    .tracked
                    .keys()
                    .map(|txid| MonitorEvent::PollError {
                        txid: *txid,
                        message: e.to_string(),
                    })
                    .collect();
            }
        };

        let mut events = Vec::new();
        let txids: Vec<Txid> = self
            .tracked
            .iter()
            .filter(|(_, s)| !s.state.is_terminal())
            .map(|(txid, _)| *txid)
            .collect();

        for txid in txids {
            events.extend(self.poll_one(client, txid, tip).await);
        }

        events
    }

    async fn poll_one(
        &mut self,
        client: &EsploraClient,
        txid: Txid,
        tip_height: u32,
    ) -> Vec<MonitorEvent> {
        let mut events = Vec::new();
        let previous_state = self
            .tracked
            .get(&txid)
            .map(|s| s.state)
            .unwrap_or(ConfirmationState::Broadcast);

        let fetched = client.get_tx_status(&txid).await;

        let new_state = match &fetched {
            Ok(status) if status.confirmed => {
                let confirmed_at = status.block_height.unwrap_or(tip_height);
                let depth = tip_height.saturating_sub(confirmed_at) + 1;
                if depth >= self.config.required_confirmations {
                    ConfirmationState::Confirmed
                } else {
                    ConfirmationState::Confirming(depth)
                }
            }
            Ok(_) => ConfirmationState::InMempool,
            Err(_) => ConfirmationState::Broadcast,
        };

        let entry = self
            .tracked
            .entry(txid)
            .or_insert_with(|| TxMonitorState::new(txid));
        entry.last_polled_at = state::current_timestamp();

        match &fetched {
            Ok(status) => {
                entry.absent_polls = 0;
                entry.ever_seen_in_mempool = true;
                if status.confirmed {
                    entry.confirmed_height = status.block_height;
                }
            }
            Err(_) if entry.ever_seen_in_mempool => entry.absent_polls += 1,
            Err(_) => {}
        }

        if entry.ever_seen_in_mempool && entry.absent_polls >= 2 {
            entry.state = ConfirmationState::Dropped;
            events.push(MonitorEvent::Dropped { txid });
            return events;
        }

        if entry.elapsed_secs() as u64 > self.config.max_wait.as_secs() && !entry.state.is_terminal()
        {
            entry.state = ConfirmationState::TimedOut;
            events.push(MonitorEvent::TimedOut { txid });
            return events;
        }

        if new_state != previous_state {
            entry.state = new_state;
            events.push(MonitorEvent::StatusChanged {
                txid,
                from: previous_state,
                to: new_state,
            });
        }

        if let ConfirmationState::Confirmed = entry.state {
            events.push(MonitorEvent::Confirmed {
                txid,
                height: entry.confirmed_height.unwrap_or(tip_height),
            });
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracking_a_txid_starts_in_broadcast_state() {
        let mut service = MonitorService::new(MonitorConfig::default());
        let txid = Txid::from_slice(&[1u8; 32]).unwrap();
        service.track(txid);
        assert_eq!(
            service.state_of(&txid).unwrap().state,
            ConfirmationState::Broadcast
        );
    }

    #[test]
    fn untrack_removes_state() {
        let mut service = MonitorService::new(MonitorConfig::default());
        let txid = Txid::from_slice(&[2u8; 32]).unwrap();
        service.track(txid);
        service.untrack(&txid);
        assert!(service.state_of(&txid).is_none());
    }

    #[test]
    fn default_config_matches_documented_defaults() {
        let config = MonitorConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.max_wait, Duration::from_secs(3600));
    }
}
