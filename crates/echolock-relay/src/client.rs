//! Fans a publish or fetch out across all configured relays in
//! parallel, tracks per-relay health, and requires a minimum number of
//! acknowledgements before calling a publish successful.

use crate::health::{HealthTracker, RelaySnapshot};
use crate::transport::{RelayError, RelayTransport};
use crate::wire::{EventFilter, RelayEvent};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct RelayClient<T: RelayTransport> {
    transport: Arc<T>,
    relay_urls: Vec<String>,
    min_acks: usize,
    health: Mutex<HealthTracker>,
}

impl<T: RelayTransport> RelayClient<T> {
    pub fn new(transport: Arc<T>, relay_urls: Vec<String>, min_acks: usize) -> Self {
        let health = HealthTracker::new(&relay_urls);
        Self {
            transport,
            relay_urls,
            min_acks,
            health: Mutex::new(health),
        }
    }

    pub async fn health_snapshot(&self) -> Vec<RelaySnapshot> {
        self.health.lock().await.snapshot()
    }

    /// Publish `event` to every currently-available relay in parallel.
    /// Succeeds once at least `min_acks` relays accept it. Before
    /// attempting anything over the network, checks that the healthy
    /// set is even large enough for `min_acks` to be reachable in the
    /// best case — there's no point dialing out to relays that can't
    /// possibly add up to a quorum.
    pub async fn publish(&self, event: RelayEvent) -> Result<usize, RelayError> {
        let candidates: Vec<String> = {
            let health = self.health.lock().await;
            self.relay_urls
                .iter()
                .filter(|url| health.is_available(url))
                .cloned()
                .collect()
        };

        if candidates.len() < self.min_acks {
            return Err(RelayError::InsufficientRelays {
                healthy: candidates.len(),
                required: self.min_acks,
            });
        }

        let futures = candidates.iter().map(|url| {
            let transport = Arc::clone(&self.transport);
            let url = url.clone();
            let event = event.clone();
            async move {
                let result = transport.publish(&url, event).await;
                (url, result)
            }
        });

        let results = futures::future::join_all(futures).await;

        let mut acks = 0usize;
        let mut health = self.health.lock().await;
        for (url, result) in &results {
            match result {
                Ok(()) => {
                    acks += 1;
                    health.record_success(url);
                }
                Err(e) => {
                    log::warn!("relay {url} rejected publish: {e}");
                    health.record_failure(url);
                }
            }
        }

        if acks >= self.min_acks {
            Ok(acks)
        } else {
            Err(RelayError::InsufficientAcks {
                required: self.min_acks,
                attempted: results.len(),
            })
        }
    }

    /// Fetch matching events from every available relay in parallel,
    /// deduplicated by event id.
    pub async fn fetch(&self, filter: &EventFilter) -> Result<Vec<RelayEvent>, RelayError> {
        let candidates: Vec<String> = {
            let health = self.health.lock().await;
            self.relay_urls
                .iter()
                .filter(|url| health.is_available(url))
                .cloned()
                .collect()
        };

        let futures = candidates.iter().map(|url| {
            let transport = Arc::clone(&self.transport);
            let url = url.clone();
            let filter = filter.clone();
            async move {
                let result = transport.fetch(&url, &filter).await;
                (url, result)
            }
        });

        let results = futures::future::join_all(futures).await;

        let mut dedup: HashMap<String, RelayEvent> = HashMap::new();
        let mut health = self.health.lock().await;
        for (url, result) in results {
            match result {
                Ok(events) => {
                    health.record_success(&url);
                    for event in events {
                        dedup.entry(event.id.clone()).or_insert(event);
                    }
                }
                Err(e) => {
                    log::warn!("relay {url} fetch failed: {e}");
                    health.record_failure(&url);
                }
            }
        }

        Ok(dedup.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::in_memory::InMemoryTransport;
    use crate::wire::KIND_HEARTBEAT;

    fn sample_event(id: &str, pubkey: &str) -> RelayEvent {
        RelayEvent {
            id: id.to_string(),
            kind: KIND_HEARTBEAT,
            pubkey: pubkey.to_string(),
            created_at: 1000,
            tags: vec![],
            content: "{}".to_string(),
            sig: "sig".to_string(),
        }
    }

    fn relays(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("wss://relay{i}")).collect()
    }

    #[tokio::test]
    async fn publish_succeeds_when_enough_relays_ack() {
        let transport = Arc::new(InMemoryTransport::new());
        let client = RelayClient::new(transport, relays(7), 5);
        let acks = client.publish(sample_event("e1", "pk")).await.unwrap();
        assert_eq!(acks, 7);
    }

    #[tokio::test]
    async fn publish_fails_when_too_few_relays_ack() {
        let transport = Arc::new(InMemoryTransport::new());
        let urls = relays(7);
        for url in &urls[0..4] {
            transport.fail(url);
        }
        let client = RelayClient::new(transport, urls, 5);
        let result = client.publish(sample_event("e1", "pk")).await;
        assert!(matches!(
            result,
            Err(RelayError::InsufficientAcks { required: 5, .. })
        ));
    }

    #[tokio::test]
    async fn fetch_dedups_by_event_id_across_relays() {
        let transport = Arc::new(InMemoryTransport::new());
        let urls = relays(3);
        let client = RelayClient::new(Arc::clone(&transport), urls.clone(), 1);

        let event = sample_event("shared-id", "pk");
        client.publish(event.clone()).await.unwrap();

        let filter = EventFilter {
            kinds: vec![KIND_HEARTBEAT],
            ..Default::default()
        };
        let fetched = client.fetch(&filter).await.unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].id, "shared-id");
    }

    #[tokio::test]
    async fn publish_refuses_without_network_call_when_healthy_set_is_too_small() {
        let transport = Arc::new(InMemoryTransport::new());
        let urls = relays(6);
        let client = RelayClient::new(Arc::clone(&transport), urls.clone(), 5);

        // Drive 2 relays unhealthy first so only 4 remain, below min_acks=5.
        {
            let mut health = client.health.lock().await;
            health.record_failure(&urls[0]);
            health.record_failure(&urls[1]);
        }

        let result = client.publish(sample_event("e1", "pk")).await;
        assert!(matches!(
            result,
            Err(RelayError::InsufficientRelays {
                healthy: 4,
                required: 5
            })
        ));
        // No publish should have reached the transport at all.
        let filter = EventFilter {
            kinds: vec![KIND_HEARTBEAT],
            ..Default::default()
        };
        assert!(client.fetch(&filter).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_relay_is_skipped_on_next_publish_until_backoff_expires() {
        let transport = Arc::new(InMemoryTransport::new());
        let urls = relays(2);
        transport.fail(&urls[0]);
        let client = RelayClient::new(transport, urls, 1);

        let result = client.publish(sample_event("e1", "pk")).await;
        assert!(result.is_ok());

        let snapshot = client.health_snapshot().await;
        let failed = snapshot.iter().find(|s| s.consecutive_failures > 0);
        assert!(failed.is_some());
    }
}
