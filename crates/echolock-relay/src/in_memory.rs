//! An in-memory `RelayTransport` for tests — no network, no nostr-sdk,
//! just a shared per-relay event log guarded by a mutex, with an
//! optional injected failure list so backoff/retry logic can be
//! exercised deterministically.

use crate::transport::{RelayError, RelayTransport};
use crate::wire::{EventFilter, RelayEvent};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

pub struct InMemoryTransport {
    events: Mutex<HashMap<String, Vec<RelayEvent>>>,
    fail_relays: Mutex<std::collections::HashSet<String>>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(HashMap::new()),
            fail_relays: Mutex::new(std::collections::HashSet::new()),
        }
    }

    /// Make every publish/fetch against `relay_url` fail until
    /// `unfail` is called — simulates an unreachable relay.
    pub fn fail(&self, relay_url: &str) {
        self.fail_relays.lock().unwrap().insert(relay_url.to_string());
    }

    pub fn unfail(&self, relay_url: &str) {
        self.fail_relays.lock().unwrap().remove(relay_url);
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RelayTransport for InMemoryTransport {
    async fn publish(&self, relay_url: &str, event: RelayEvent) -> Result<(), RelayError> {
        if self.fail_relays.lock().unwrap().contains(relay_url) {
            return Err(RelayError::Publish(format!("{relay_url} is down")));
        }
        self.events
            .lock()
            .unwrap()
            .entry(relay_url.to_string())
            .or_default()
            .push(event);
        Ok(())
    }

    async fn fetch(
        &self,
        relay_url: &str,
        filter: &EventFilter,
    ) -> Result<Vec<RelayEvent>, RelayError> {
        if self.fail_relays.lock().unwrap().contains(relay_url) {
            return Err(RelayError::Fetch(format!("{relay_url} is down")));
        }
        let events = self.events.lock().unwrap();
        Ok(events
            .get(relay_url)
            .map(|evs| evs.iter().filter(|e| filter.matches(e)).cloned().collect())
            .unwrap_or_default())
    }
}
