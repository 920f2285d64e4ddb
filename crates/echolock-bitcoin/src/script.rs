//! CLTV timelock script construction and P2SH addressing.
//!
//! EchoLock's release condition is deliberately the simplest timelock
//! Bitcoin Script can express — a single absolute locktime height and
//! a single owner pubkey, wrapped P2SH so funds can be sent to an
//! ordinary-looking address before the switch ever triggers:
//!
//! ```text
//! <locktime_height> OP_CLTV OP_DROP <pubkey> OP_CHECKSIG
//! ```
//!
//! This is not a miniscript/CSV inheritance policy — EchoLock has no
//! recovery paths or multi-party descriptors, just one spender who may
//! not spend before `locktime_height`.

use bitcoin::blockdata::opcodes::all::{OP_CHECKSIG, OP_CLTV, OP_DROP};
use bitcoin::blockdata::script::{Builder, Script, ScriptBuf};
use bitcoin::{Address, Network, PublicKey};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("locktime height must be a valid absolute locktime (< 500,000,000)")]
    InvalidLocktime(u32),
    #[error("mainnet is not a supported network for EchoLock timelocks")]
    MainnetNotSupported,
}

/// The height below which a CLTV value is interpreted as a block
/// height rather than a Unix timestamp (BIP-65).
pub const LOCKTIME_THRESHOLD: u32 = 500_000_000;

/// Build the raw `<height> OP_CLTV OP_DROP <pubkey> OP_CHECKSIG` script.
pub fn build_cltv_script(locktime_height: u32, pubkey: &PublicKey) -> Result<ScriptBuf, ScriptError> {
    if locktime_height >= LOCKTIME_THRESHOLD {
        return Err(ScriptError::InvalidLocktime(locktime_height));
    }

    Ok(Builder::new()
        .push_int(locktime_height as i64)
        .push_opcode(OP_CLTV)
        .push_opcode(OP_DROP)
        .push_key(pubkey)
        .push_opcode(OP_CHECKSIG)
        .into_script())
}

/// Derive the P2SH address for a CLTV redeem script.
///
/// Mainnet is hard-flagged off: EchoLock's timelock path has not had
/// the economic-safety review a mainnet deployment needs, so this
/// function refuses to produce a mainnet address at all.
pub fn p2sh_address(redeem_script: &Script, network: Network) -> Result<Address, ScriptError> {
    if network == Network::Bitcoin {
        return Err(ScriptError::MainnetNotSupported);
    }
    Ok(Address::p2sh(redeem_script, network).expect("P2SH redeem scripts are always <= 520 bytes"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::secp256k1::Secp256k1;
    use bitcoin::PrivateKey;

    fn sample_pubkey() -> PublicKey {
        let secp = Secp256k1::new();
        let privkey = PrivateKey::generate(Network::Testnet);
        privkey.public_key(&secp)
    }

    #[test]
    fn builds_expected_script_shape() {
        let pubkey = sample_pubkey();
        let script = build_cltv_script(800_000, &pubkey).unwrap();
        let bytes = script.as_bytes();
        assert_eq!(*bytes.last().unwrap(), OP_CHECKSIG.to_u8());
    }

    #[test]
    fn rejects_timestamp_style_locktime() {
        let pubkey = sample_pubkey();
        assert!(matches!(
            build_cltv_script(LOCKTIME_THRESHOLD, &pubkey),
            Err(ScriptError::InvalidLocktime(_))
        ));
    }

    #[test]
    fn p2sh_address_rejects_mainnet() {
        let pubkey = sample_pubkey();
        let script = build_cltv_script(800_000, &pubkey).unwrap();
        assert!(matches!(
            p2sh_address(&script, Network::Bitcoin),
            Err(ScriptError::MainnetNotSupported)
        ));
    }

    #[test]
    fn p2sh_address_succeeds_on_testnet() {
        let pubkey = sample_pubkey();
        let script = build_cltv_script(800_000, &pubkey).unwrap();
        let address = p2sh_address(&script, Network::Testnet).unwrap();
        assert_eq!(address.network().to_owned(), Network::Testnet.into());
    }

    #[test]
    fn same_inputs_produce_same_script() {
        let pubkey = sample_pubkey();
        let a = build_cltv_script(800_000, &pubkey).unwrap();
        let b = build_cltv_script(800_000, &pubkey).unwrap();
        assert_eq!(a, b);
    }
}
