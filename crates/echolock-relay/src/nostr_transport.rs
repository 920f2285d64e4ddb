//! Real relay transport backed by `nostr-sdk`.
//!
//! Build a client, add the single relay this transport instance owns,
//! connect, sign with the service keypair, and send. One
//! `NostrTransport` per relay URL keeps the per-relay connection
//! lifecycle simple; `RelayClient` fans out across many of them.

use crate::transport::{RelayError, RelayTransport};
use crate::wire::{EventFilter, RelayEvent};
use async_trait::async_trait;
use nostr_sdk::prelude::*;
use std::time::Duration;

pub struct NostrTransport {
    keys: Keys,
}

impl NostrTransport {
    pub fn new(keys: Keys) -> Self {
        Self { keys }
    }

    async fn client_for(&self, relay_url: &str) -> Result<Client, RelayError> {
        let client = Client::new(self.keys.clone());
        client
            .add_relay(relay_url)
            .await
            .map_err(|e| RelayError::Connection(e.to_string()))?;
        client.connect().await;
        Ok(client)
    }
}

#[async_trait]
impl RelayTransport for NostrTransport {
    async fn publish(&self, relay_url: &str, event: RelayEvent) -> Result<(), RelayError> {
        let client = self.client_for(relay_url).await?;

        let tags: Vec<Tag> = event
            .tags
            .iter()
            .map(|(k, v)| Tag::custom(TagKind::custom(k.clone()), [v.clone()]))
            .collect();
        let builder =
            EventBuilder::new(Kind::Custom(event.kind as u16), event.content.clone(), tags);
        let signed = builder
            .to_event(&self.keys)
            .map_err(|e| RelayError::Publish(e.to_string()))?;

        client
            .send_event(signed)
            .await
            .map_err(|e| RelayError::Publish(e.to_string()))?;

        client.disconnect().await.ok();
        Ok(())
    }

    async fn fetch(
        &self,
        relay_url: &str,
        filter: &EventFilter,
    ) -> Result<Vec<RelayEvent>, RelayError> {
        let client = self.client_for(relay_url).await?;

        let mut nostr_filter = Filter::new();
        if !filter.kinds.is_empty() {
            nostr_filter = nostr_filter
                .kinds(filter.kinds.iter().map(|k| Kind::Custom(*k as u16)).collect::<Vec<_>>());
        }
        if !filter.authors.is_empty() {
            let authors: Result<Vec<PublicKey>, _> =
                filter.authors.iter().map(|a| PublicKey::parse(a)).collect();
            let authors = authors.map_err(|e| RelayError::Fetch(e.to_string()))?;
            nostr_filter = nostr_filter.authors(authors);
        }
        if let Some(since) = filter.since {
            nostr_filter = nostr_filter.since(Timestamp::from(since as u64));
        }
        if let Some(d_tag) = &filter.d_tag {
            nostr_filter = nostr_filter.identifier(d_tag.clone());
        }

        let events = client
            .get_events_of(vec![nostr_filter], Some(Duration::from_secs(10)))
            .await
            .map_err(|e| RelayError::Fetch(e.to_string()))?;

        client.disconnect().await.ok();

        let mut out = Vec::with_capacity(events.len());
        for event in events {
            if event.verify().is_err() {
                continue;
            }
            let tags = event
                .tags
                .iter()
                .filter_map(|tag| {
                    let slice = tag.as_vec();
                    let key = slice.first()?;
                    let value = slice.get(1)?;
                    Some((key.clone(), value.clone()))
                })
                .collect();
            out.push(RelayEvent {
                id: event.id.to_hex(),
                kind: event.kind.as_u16(),
                pubkey: event.pubkey.to_hex(),
                created_at: event.created_at.as_u64() as i64,
                tags,
                content: event.content.clone(),
                sig: event.sig.to_string(),
            });
        }
        Ok(out)
    }
}
