//! Esplora-compatible HTTP client.
//!
//! EchoLock speaks the esplora REST API — the interface
//! `blockstream.info`/`mempool.space` expose — over plain HTTPS via
//! `reqwest`, which needs no persistent TCP connection and is trivial
//! to point at a self-hosted instance.

use crate::safety::{self, SafetyError};
use bitcoin::consensus::{deserialize, serialize};
use bitcoin::{Address, Amount, Network, OutPoint, ScriptBuf, Transaction, Txid};
use serde::Deserialize;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("esplora request failed: {0}")]
    Http(String),
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("transaction not found: {0}")]
    TxNotFound(Txid),
    #[error("broadcast failed: {0}")]
    BroadcastFailed(String),
    #[error("no UTXOs found for address")]
    NoUtxos,
    #[error(transparent)]
    Safety(#[from] SafetyError),
}

/// A UTXO discovered via the esplora address endpoint.
#[derive(Debug, Clone)]
pub struct Utxo {
    pub outpoint: OutPoint,
    pub value: Amount,
    pub height: u32,
    pub script_pubkey: ScriptBuf,
}

#[derive(Debug, Deserialize)]
struct EsploraUtxoStatus {
    confirmed: bool,
    block_height: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct EsploraUtxo {
    txid: String,
    vout: u32,
    value: u64,
    status: EsploraUtxoStatus,
}

/// Confirmation status for a single transaction.
#[derive(Debug, Clone, Copy)]
pub struct TxStatus {
    pub confirmed: bool,
    pub block_height: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeeEstimates {
    /// Map of confirmation-target blocks to sat/vB fee rate.
    #[serde(flatten)]
    pub targets: std::collections::BTreeMap<String, f64>,
}

pub struct EsploraClient {
    http: reqwest::Client,
    base_url: String,
    network: Network,
}

impl EsploraClient {
    /// Construct a client against `base_url` (e.g.
    /// `https://blockstream.info/testnet/api`). Rejects mainnet per
    /// EchoLock's testnet-only Bitcoin policy.
    pub fn new(base_url: &str, network: Network) -> Result<Self, Error> {
        safety::require_non_mainnet(network)?;
        if !base_url.starts_with("https://") && !base_url.starts_with("http://127.0.0.1") {
            log::warn!("connecting to esplora without TLS — insecure outside local testing");
        }
        Ok(Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            network,
        })
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub async fn get_tip_height(&self) -> Result<u32, Error> {
        let url = format!("{}/blocks/tip/height", self.base_url);
        let text = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Connection(e.to_string()))?
            .text()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        text.trim()
            .parse::<u32>()
            .map_err(|e| Error::Http(format!("unparseable tip height {text:?}: {e}")))
    }

    pub async fn get_utxos(&self, address: &Address) -> Result<Vec<Utxo>, Error> {
        let script_pubkey = address.script_pubkey();
        let url = format!("{}/address/{}/utxo", self.base_url, address);
        let entries: Vec<EsploraUtxo> = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Connection(e.to_string()))?
            .json()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let utxos = entries
            .into_iter()
            .map(|u| {
                let txid = Txid::from_str(&u.txid)
                    .map_err(|e| Error::InvalidAddress(format!("bad txid {}: {e}", u.txid)))?;
                Ok(Utxo {
                    outpoint: OutPoint {
                        txid,
                        vout: u.vout,
                    },
                    value: Amount::from_sat(u.value),
                    height: u.status.block_height.unwrap_or(0),
                    script_pubkey: script_pubkey.clone(),
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;

        if utxos.is_empty() {
            return Err(Error::NoUtxos);
        }
        Ok(utxos)
    }

    /// Fetch confirmation status for `txid` without downloading the
    /// full transaction.
    pub async fn get_tx_status(&self, txid: &Txid) -> Result<TxStatus, Error> {
        let url = format!("{}/tx/{}/status", self.base_url, txid);
        let status: EsploraUtxoStatus = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|_| Error::TxNotFound(*txid))?
            .json()
            .await
            .map_err(|_| Error::TxNotFound(*txid))?;
        Ok(TxStatus {
            confirmed: status.confirmed,
            block_height: status.block_height,
        })
    }

    pub async fn get_transaction(&self, txid: &Txid) -> Result<Transaction, Error> {
        let url = format!("{}/tx/{}/hex", self.base_url, txid);
        let hex = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|_| Error::TxNotFound(*txid))?
            .text()
            .await
            .map_err(|_| Error::TxNotFound(*txid))?;
        let bytes = hex::decode(hex.trim()).map_err(|_| Error::TxNotFound(*txid))?;
        deserialize(&bytes).map_err(|_| Error::TxNotFound(*txid))
    }

    pub async fn broadcast(&self, tx: &Transaction) -> Result<Txid, Error> {
        let hex = hex::encode(serialize(tx));
        let url = format!("{}/tx", self.base_url);
        let response = self
            .http
            .post(&url)
            .body(hex)
            .send()
            .await
            .map_err(|e| Error::BroadcastFailed(e.to_string()))?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::BroadcastFailed(body));
        }
        let txid_hex = response
            .text()
            .await
            .map_err(|e| Error::BroadcastFailed(e.to_string()))?;
        Txid::from_str(txid_hex.trim())
            .map_err(|e| Error::BroadcastFailed(format!("bad txid in response: {e}")))
    }

    pub async fn get_fee_estimates(&self) -> Result<FeeEstimates, Error> {
        let url = format!("{}/fee-estimates", self.base_url);
        self.http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Connection(e.to_string()))?
            .json()
            .await
            .map_err(|e| Error::Http(e.to_string()))
    }
}

/// Default esplora instances for each supported network.
pub fn default_base_url(network: Network) -> &'static str {
    match network {
        Network::Testnet => "https://blockstream.info/testnet/api",
        Network::Signet => "https://mempool.space/signet/api",
        Network::Regtest => "http://127.0.0.1:3002",
        _ => "https://blockstream.info/testnet/api",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_servers_are_sane() {
        assert!(default_base_url(Network::Testnet).contains("testnet"));
        assert!(default_base_url(Network::Signet).contains("signet"));
    }

    #[test]
    fn mainnet_client_construction_is_refused() {
        assert!(EsploraClient::new("https://blockstream.info/api", Network::Bitcoin).is_err());
    }

    #[test]
    fn testnet_client_construction_succeeds() {
        assert!(EsploraClient::new(default_base_url(Network::Testnet), Network::Testnet).is_ok());
    }
}
