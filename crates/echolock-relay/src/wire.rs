//! The relay wire format: Nostr-style events carrying EchoLock gossip.

use serde::{Deserialize, Serialize};

/// Owner liveness heartbeat — refreshes a switch's expiry on relays
/// that watch for it.
pub const KIND_HEARTBEAT: u16 = 30078;
/// A single authenticated Shamir share, stored ahead of any trigger.
pub const KIND_SHARE_STORAGE: u16 = 30079;
/// A released share, published once a switch has triggered.
pub const KIND_SHARE_RELEASE: u16 = 30080;
/// An encrypted atomic payload envelope.
pub const KIND_ATOMIC_PAYLOAD: u16 = 30081;

/// A relay event in wire form. Mirrors the shape of a signed Nostr
/// event closely enough that a `NostrTransport` can translate directly
/// to and from `nostr_sdk::Event`, while staying transport-agnostic so
/// an in-memory transport can be substituted in tests.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RelayEvent {
    pub id: String,
    pub kind: u16,
    pub pubkey: String,
    pub created_at: i64,
    /// Key-value tags, Nostr-style. EchoLock relies on a few well-known
    /// keys: `d` addresses a share within a switch as `switch_id:index`
    /// for replaceable-event lookups, `expiry` carries a unix timestamp
    /// relays can use for garbage collection, and `btc_txid` carries
    /// the hex txid of the switch's timelock spend once one exists.
    pub tags: Vec<(String, String)>,
    pub content: String,
    pub sig: String,
}

impl RelayEvent {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// A server-side filter for fetching events back from a relay.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub kinds: Vec<u16>,
    pub authors: Vec<String>,
    pub since: Option<i64>,
    /// Match only events whose `d` tag equals this value exactly.
    pub d_tag: Option<String>,
}

impl EventFilter {
    pub fn matches(&self, event: &RelayEvent) -> bool {
        if !self.kinds.is_empty() && !self.kinds.contains(&event.kind) {
            return false;
        }
        if !self.authors.is_empty() && !self.authors.contains(&event.pubkey) {
            return false;
        }
        if let Some(since) = self.since {
            if event.created_at < since {
                return false;
            }
        }
        if let Some(d_tag) = &self.d_tag {
            if event.tag("d") != Some(d_tag.as_str()) {
                return false;
            }
        }
        true
    }
}
