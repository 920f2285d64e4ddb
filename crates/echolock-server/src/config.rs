//! Server configuration — parsed from a TOML file plus environment
//! variable overrides.
//!
//! Priority: environment variables > config file > defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ServerSection,

    pub switch: SwitchSection,

    #[serde(default)]
    pub relay: RelaySection,

    #[serde(default)]
    pub bitcoin: BitcoinSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// How often the daemon re-evaluates switches against the
    /// check-in clock (seconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            poll_interval_secs: default_poll_interval(),
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchSection {
    pub id: String,
    pub owner_label: String,

    /// Shares required to reconstruct the secret (of `threshold_total`).
    pub threshold_required: u32,
    pub threshold_total: u32,

    #[serde(default = "default_pbkdf2_iterations")]
    pub pbkdf2_iterations: u32,

    #[serde(default = "default_check_in_interval")]
    pub check_in_interval_secs: u64,

    /// Delivery addresses notified once the switch releases. EchoLock
    /// treats the actual send (email, matrix, whatever) as an external
    /// collaborator boundary — this is just who to hand the plaintext
    /// to.
    #[serde(default)]
    pub recipients: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelaySection {
    #[serde(default = "default_relay_urls")]
    pub relay_urls: Vec<String>,

    #[serde(default = "default_min_relay_acks")]
    pub min_relay_acks: usize,

    /// Hex-encoded secret key for the service's Nostr identity. If
    /// unset, an ephemeral keypair is generated at startup — fine for
    /// a single run, but release events won't be attributable to a
    /// stable pubkey across restarts.
    #[serde(default)]
    pub service_secret_key: Option<String>,
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            relay_urls: default_relay_urls(),
            min_relay_acks: default_min_relay_acks(),
            service_secret_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BitcoinSection {
    #[serde(default)]
    pub use_bitcoin_timelock: bool,

    /// "testnet", "signet", or "regtest" — mainnet is refused at
    /// validation time, not just in `echolock-bitcoin`.
    #[serde(default = "default_bitcoin_network")]
    pub network: String,

    #[serde(default)]
    pub esplora_url: Option<String>,

    #[serde(default = "default_min_confirmations")]
    pub min_bitcoin_confirmations: u32,

    #[serde(default = "default_confirmation_timeout_ms")]
    pub bitcoin_confirmation_timeout_ms: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub bitcoin_poll_interval_ms: u64,

    #[serde(default = "default_max_testnet_amount_sats")]
    pub max_testnet_amount_sats: u64,

    #[serde(default = "default_min_blocks_past_timelock")]
    pub min_blocks_past_timelock: u32,
}

impl Default for BitcoinSection {
    fn default() -> Self {
        Self {
            use_bitcoin_timelock: false,
            network: default_bitcoin_network(),
            esplora_url: None,
            min_bitcoin_confirmations: default_min_confirmations(),
            bitcoin_confirmation_timeout_ms: default_confirmation_timeout_ms(),
            bitcoin_poll_interval_ms: default_poll_interval_ms(),
            max_testnet_amount_sats: default_max_testnet_amount_sats(),
            min_blocks_past_timelock: default_min_blocks_past_timelock(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/data/echolock")
}

fn default_poll_interval() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_pbkdf2_iterations() -> u32 {
    echolock_crypto::MIN_PBKDF2_ITERATIONS
}

fn default_check_in_interval() -> u64 {
    30 * 24 * 3600 // 30 days
}

fn default_relay_urls() -> Vec<String> {
    vec![
        "wss://relay.damus.io".into(),
        "wss://relay.nostr.band".into(),
        "wss://nos.lol".into(),
        "wss://relay.snort.social".into(),
        "wss://nostr.wine".into(),
        "wss://relay.primal.net".into(),
        "wss://offchain.pub".into(),
    ]
}

fn default_min_relay_acks() -> usize {
    echolock_relay::DEFAULT_MIN_RELAY_ACKS
}

fn default_bitcoin_network() -> String {
    "testnet".to_string()
}

fn default_min_confirmations() -> u32 {
    1
}

fn default_confirmation_timeout_ms() -> u64 {
    3_600_000
}

fn default_poll_interval_ms() -> u64 {
    30_000
}

fn default_max_testnet_amount_sats() -> u64 {
    echolock_bitcoin::MAX_TESTNET_AMOUNT_SATS
}

fn default_min_blocks_past_timelock() -> u32 {
    echolock_bitcoin::MIN_BLOCKS_PAST_TIMELOCK
}

impl ServerConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: ServerConfig =
            toml::from_str(&contents).with_context(|| "Failed to parse TOML config")?;
        Ok(config)
    }

    /// Apply environment variable overrides.
    ///
    /// Supported env vars:
    /// - `ECHOLOCK_DATA_DIR`
    /// - `ECHOLOCK_POLL_INTERVAL`
    /// - `ECHOLOCK_LOG_LEVEL`
    /// - `ECHOLOCK_CHECK_IN_INTERVAL`
    /// - `ECHOLOCK_RELAY_URLS` (comma-separated)
    /// - `ECHOLOCK_MIN_RELAY_ACKS`
    /// - `ECHOLOCK_BITCOIN_NETWORK`
    /// - `ECHOLOCK_ESPLORA_URL`
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("ECHOLOCK_DATA_DIR") {
            self.server.data_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("ECHOLOCK_POLL_INTERVAL") {
            if let Ok(secs) = v.parse::<u64>() {
                self.server.poll_interval_secs = secs;
            }
        }
        if let Ok(v) = std::env::var("ECHOLOCK_LOG_LEVEL") {
            self.server.log_level = v;
        }
        if let Ok(v) = std::env::var("ECHOLOCK_CHECK_IN_INTERVAL") {
            if let Ok(secs) = v.parse::<u64>() {
                self.switch.check_in_interval_secs = secs;
            }
        }
        if let Ok(v) = std::env::var("ECHOLOCK_RELAY_URLS") {
            self.relay.relay_urls = v.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(v) = std::env::var("ECHOLOCK_MIN_RELAY_ACKS") {
            if let Ok(n) = v.parse::<usize>() {
                self.relay.min_relay_acks = n;
            }
        }
        if let Ok(v) = std::env::var("ECHOLOCK_BITCOIN_NETWORK") {
            self.bitcoin.network = v;
        }
        if let Ok(v) = std::env::var("ECHOLOCK_ESPLORA_URL") {
            self.bitcoin.esplora_url = Some(v);
        }
    }

    pub fn network(&self) -> Result<bitcoin::Network> {
        match self.bitcoin.network.as_str() {
            "testnet" | "testnet3" => Ok(bitcoin::Network::Testnet),
            "signet" => Ok(bitcoin::Network::Signet),
            "regtest" => Ok(bitcoin::Network::Regtest),
            other => anyhow::bail!(
                "bitcoin.network {other:?} is not supported — EchoLock's timelock path is testnet-only"
            ),
        }
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.switch.id.is_empty(), "switch.id must not be empty");
        anyhow::ensure!(
            self.switch.threshold_required >= 1
                && self.switch.threshold_required <= self.switch.threshold_total,
            "switch.threshold_required must be between 1 and switch.threshold_total"
        );
        anyhow::ensure!(
            self.switch.pbkdf2_iterations >= echolock_crypto::MIN_PBKDF2_ITERATIONS,
            "switch.pbkdf2_iterations must be >= {}",
            echolock_crypto::MIN_PBKDF2_ITERATIONS
        );
        anyhow::ensure!(
            self.switch.check_in_interval_secs >= 3600,
            "switch.check_in_interval_secs must be >= 3600"
        );

        anyhow::ensure!(
            self.relay.relay_urls.len() >= echolock_relay::MIN_RECOMMENDED_RELAY_COUNT,
            "relay.relay_urls should list at least {} relays",
            echolock_relay::MIN_RECOMMENDED_RELAY_COUNT
        );
        anyhow::ensure!(
            self.relay.min_relay_acks >= 1 && self.relay.min_relay_acks <= self.relay.relay_urls.len(),
            "relay.min_relay_acks must be between 1 and the configured relay count"
        );

        if self.bitcoin.use_bitcoin_timelock {
            self.network()?;
            anyhow::ensure!(
                self.bitcoin.esplora_url.is_some(),
                "bitcoin.esplora_url must be set when bitcoin.use_bitcoin_timelock is true"
            );
            anyhow::ensure!(
                self.bitcoin.max_testnet_amount_sats <= echolock_bitcoin::MAX_TESTNET_AMOUNT_SATS,
                "bitcoin.max_testnet_amount_sats cannot exceed the hard safety cap of {}",
                echolock_bitcoin::MAX_TESTNET_AMOUNT_SATS
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn minimal_toml() -> &'static str {
        r#"
[switch]
id = "sw-1"
owner_label = "alice"
threshold_required = 3
threshold_total = 5
"#
    }

    #[test]
    fn parses_minimal_config_with_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", minimal_toml()).unwrap();
        let config = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.switch.threshold_required, 3);
        assert_eq!(
            config.switch.pbkdf2_iterations,
            echolock_crypto::MIN_PBKDF2_ITERATIONS
        );
        assert_eq!(config.relay.relay_urls.len(), 7);
        assert_eq!(config.relay.min_relay_acks, 5);
        assert!(!config.bitcoin.use_bitcoin_timelock);
    }

    #[test]
    fn validation_passes_for_default_config() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", minimal_toml()).unwrap();
        let config = ServerConfig::from_file(file.path()).unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validation_rejects_threshold_above_total() {
        let toml = r#"
[switch]
id = "sw-1"
owner_label = "alice"
threshold_required = 6
threshold_total = 5
"#;
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", toml).unwrap();
        let config = ServerConfig::from_file(file.path()).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validation_rejects_mainnet_when_bitcoin_enabled() {
        let toml = r#"
[switch]
id = "sw-1"
owner_label = "alice"
threshold_required = 3
threshold_total = 5

[bitcoin]
use_bitcoin_timelock = true
network = "bitcoin"
esplora_url = "https://blockstream.info/api"
"#;
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", toml).unwrap();
        let config = ServerConfig::from_file(file.path()).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_overrides_applied() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", minimal_toml()).unwrap();
        let mut config = ServerConfig::from_file(file.path()).unwrap();

        std::env::set_var("ECHOLOCK_POLL_INTERVAL", "120");
        std::env::set_var("ECHOLOCK_BITCOIN_NETWORK", "signet");
        config.apply_env_overrides();
        std::env::remove_var("ECHOLOCK_POLL_INTERVAL");
        std::env::remove_var("ECHOLOCK_BITCOIN_NETWORK");

        assert_eq!(config.server.poll_interval_secs, 120);
        assert_eq!(config.bitcoin.network, "signet");
    }
}
