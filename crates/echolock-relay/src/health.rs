//! Per-relay health tracking with exponential backoff.
//!
//! A relay that fails is not retried immediately — each consecutive
//! failure doubles the retry delay (capped), with a small jitter so a
//! fleet of clients doesn't all retry the same relay in lockstep.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

const BASE_DELAY: Duration = Duration::from_secs(1);
const MAX_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct RelayHealth {
    pub consecutive_failures: u32,
    pub next_retry_at: Option<Instant>,
}

impl Default for RelayHealth {
    fn default() -> Self {
        Self {
            consecutive_failures: 0,
            next_retry_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelaySnapshot {
    pub relay_url: String,
    pub consecutive_failures: u32,
    pub healthy: bool,
}

/// Tracks health for a fixed set of relay URLs.
pub struct HealthTracker {
    relays: HashMap<String, RelayHealth>,
}

impl HealthTracker {
    pub fn new(relay_urls: &[String]) -> Self {
        let relays = relay_urls
            .iter()
            .map(|url| (url.clone(), RelayHealth::default()))
            .collect();
        Self { relays }
    }

    pub fn record_success(&mut self, relay_url: &str) {
        let entry = self.relays.entry(relay_url.to_string()).or_default();
        entry.consecutive_failures = 0;
        entry.next_retry_at = None;
    }

    pub fn record_failure(&mut self, relay_url: &str) {
        let entry = self.relays.entry(relay_url.to_string()).or_default();
        entry.consecutive_failures += 1;
        let delay = backoff_delay(entry.consecutive_failures);
        entry.next_retry_at = Some(Instant::now() + delay);
    }

    /// Is this relay eligible to be tried right now?
    pub fn is_available(&self, relay_url: &str) -> bool {
        match self.relays.get(relay_url) {
            None => true,
            Some(health) => match health.next_retry_at {
                None => true,
                Some(retry_at) => Instant::now() >= retry_at,
            },
        }
    }

    pub fn available_relays(&self) -> Vec<String> {
        self.relays
            .keys()
            .filter(|url| self.is_available(url))
            .cloned()
            .collect()
    }

    pub fn snapshot(&self) -> Vec<RelaySnapshot> {
        self.relays
            .iter()
            .map(|(url, health)| RelaySnapshot {
                relay_url: url.clone(),
                consecutive_failures: health.consecutive_failures,
                healthy: self.is_available(url),
            })
            .collect()
    }
}

fn backoff_delay(consecutive_failures: u32) -> Duration {
    let exp = consecutive_failures.min(6); // 2^6 * 1s = 64s, already above MAX_DELAY
    let base = BASE_DELAY.saturating_mul(1u32 << exp.min(31));
    let capped = base.min(MAX_DELAY);
    let jitter_ms = rand::thread_rng().gen_range(0..1000);
    capped + Duration::from_millis(jitter_ms)
}
