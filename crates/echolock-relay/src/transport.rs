//! The `RelayTransport` capability boundary.
//!
//! EchoLock needs its coordinator and switch logic to be testable
//! without real network relays, so the concrete nostr-sdk client sits
//! behind this trait; tests substitute an in-memory transport instead.

use crate::wire::{EventFilter, RelayEvent};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("relay connection failed: {0}")]
    Connection(String),
    #[error("relay publish failed: {0}")]
    Publish(String),
    #[error("relay fetch failed: {0}")]
    Fetch(String),
    #[error("event signature verification failed")]
    BadSignature,
    #[error("fewer than {required} of {attempted} relays acknowledged the publish")]
    InsufficientAcks { required: usize, attempted: usize },
    #[error("only {healthy} of {required} needed relays are healthy; refusing to publish")]
    InsufficientRelays { healthy: usize, required: usize },
}

#[async_trait]
pub trait RelayTransport: Send + Sync {
    async fn publish(&self, relay_url: &str, event: RelayEvent) -> Result<(), RelayError>;
    async fn fetch(
        &self,
        relay_url: &str,
        filter: &EventFilter,
    ) -> Result<Vec<RelayEvent>, RelayError>;
}
