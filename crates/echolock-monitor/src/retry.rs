//! Broadcast retry policy.
//!
//! Network-class failures (connection drops, timeouts) are worth
//! retrying with backoff; content-class failures (the esplora server
//! rejected the transaction itself) are not, since retrying sends the
//! same rejected bytes again.

use bitcoin::Transaction;
use echolock_bitcoin::{EsploraClient, EsploraError};
use std::time::Duration;

/// Delays between broadcast retries, applied only to network-class
/// errors.
pub const RETRY_DELAYS: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(4),
];

fn is_retryable(err: &EsploraError) -> bool {
    matches!(err, EsploraError::Connection(_) | EsploraError::Http(_))
}

/// Broadcast `tx`, retrying network-class failures per [`RETRY_DELAYS`].
/// Content-class failures (a rejected or already-spent transaction)
/// return immediately without retrying.
pub async fn broadcast_with_retry(
    client: &EsploraClient,
    tx: &Transaction,
) -> Result<bitcoin::Txid, EsploraError> {
    let mut last_err = None;

    for delay in RETRY_DELAYS.iter().copied().chain(std::iter::once(Duration::ZERO)) {
        match client.broadcast(tx).await {
            Ok(txid) => return Ok(txid),
            Err(e) => {
                if !is_retryable(&e) {
                    return Err(e);
                }
                log::warn!("broadcast attempt failed, will retry: {e}");
                last_err = Some(e);
                if delay > Duration::ZERO {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    Err(last_err.expect("loop always runs at least once"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_errors_are_retryable() {
        assert!(is_retryable(&EsploraError::Connection("x".into())));
        assert!(is_retryable(&EsploraError::Http("x".into())));
    }

    #[test]
    fn content_errors_are_not_retryable() {
        assert!(!is_retryable(&EsploraError::BroadcastFailed("bad tx".into())));
        assert!(!is_retryable(&EsploraError::NoUtxos));
    }
}
