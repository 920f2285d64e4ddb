//! Relay gossip distribution: publishing and fetching atomic payload
//! shares across a fleet of Nostr-style relays, with health tracking
//! and backoff so one or two dead relays never block the others.

pub mod client;
pub mod health;
pub mod in_memory;
pub mod nostr_transport;
pub mod transport;
pub mod wire;

pub use client::RelayClient;
pub use health::{HealthTracker, RelayHealth, RelaySnapshot};
pub use in_memory::InMemoryTransport;
pub use nostr_transport::NostrTransport;
pub use transport::{RelayError, RelayTransport};
pub use wire::{EventFilter, RelayEvent, KIND_ATOMIC_PAYLOAD, KIND_HEARTBEAT, KIND_SHARE_RELEASE, KIND_SHARE_STORAGE};

/// Default minimum acknowledgements required for a publish to count
/// as successful, out of a configured relay set that should number at
/// least seven.
pub const DEFAULT_MIN_RELAY_ACKS: usize = 5;
pub const MIN_RECOMMENDED_RELAY_COUNT: usize = 7;
