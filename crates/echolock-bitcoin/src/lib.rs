//! CLTV timelock scripting, UTXO handling, and esplora-backed chain
//! access for EchoLock's optional Bitcoin dead-man's-switch layer.
//!
//! Every entry point here refuses `Network::Bitcoin` — see
//! [`safety::require_non_mainnet`]. This crate talks to testnet,
//! signet, or regtest only.

pub mod esplora;
pub mod fee;
pub mod safety;
pub mod script;
pub mod spend;
pub mod utxo;

pub use esplora::{default_base_url, EsploraClient, Error as EsploraError, FeeEstimates, TxStatus, Utxo};
pub use fee::{resolve_fee_rate, FeePriority};
pub use safety::{
    require_non_mainnet, require_timelock_margin, require_within_amount_cap, SafetyError,
    MAX_TESTNET_AMOUNT_SATS, MIN_BLOCKS_PAST_TIMELOCK,
};
pub use script::{build_cltv_script, p2sh_address, ScriptError, LOCKTIME_THRESHOLD};
pub use spend::{sign_cltv_input, SpendError};
pub use utxo::{select_utxos, SelectionResult};
