//! UTXO selection.

use crate::esplora::Utxo;
use crate::safety::{self, SafetyError};
use bitcoin::Amount;

#[derive(Debug)]
pub struct SelectionResult {
    pub selected: Vec<Utxo>,
    pub total: Amount,
    pub change: Amount,
}

/// Greedily select UTXOs (largest first) until `target` plus `fee` is
/// covered. Enforces the testnet amount safety cap on the total
/// selected.
pub fn select_utxos(
    mut utxos: Vec<Utxo>,
    target: Amount,
    fee: Amount,
) -> Result<SelectionResult, SafetyError> {
    utxos.sort_by_key(|u| std::cmp::Reverse(u.value));

    let needed = target + fee;
    let mut total = Amount::ZERO;
    let mut selected = Vec::new();

    for utxo in utxos {
        if total >= needed {
            break;
        }
        total += utxo.value;
        selected.push(utxo);
    }

    if total < needed {
        return Err(SafetyError::AmountExceedsCap(needed.to_sat()));
    }

    safety::require_within_amount_cap(total.to_sat())?;

    Ok(SelectionResult {
        selected,
        total,
        change: total - needed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::{OutPoint, ScriptBuf, Txid};
    use std::str::FromStr;

    fn utxo(sats: u64, vout: u32) -> Utxo {
        Utxo {
            outpoint: OutPoint {
                txid: Txid::from_str(
                    "0000000000000000000000000000000000000000000000000000000000000001",
                )
                .unwrap_or_else(|_| Txid::from_str(&"11".repeat(32)).unwrap()),
                vout,
            },
            value: Amount::from_sat(sats),
            height: 100,
            script_pubkey: ScriptBuf::new(),
        }
    }

    #[test]
    fn selects_minimal_utxo_set_covering_target() {
        let utxos = vec![utxo(10_000, 0), utxo(5_000, 1), utxo(50_000, 2)];
        let result = select_utxos(utxos, Amount::from_sat(30_000), Amount::from_sat(500)).unwrap();
        assert_eq!(result.selected.len(), 1);
        assert_eq!(result.total, Amount::from_sat(50_000));
    }

    #[test]
    fn fails_when_funds_insufficient() {
        let utxos = vec![utxo(1_000, 0)];
        assert!(select_utxos(utxos, Amount::from_sat(30_000), Amount::from_sat(500)).is_err());
    }

    #[test]
    fn rejects_selection_exceeding_safety_cap() {
        let utxos = vec![utxo(2_000_000, 0)];
        let result = select_utxos(utxos, Amount::from_sat(1_500_000), Amount::from_sat(0));
        assert!(result.is_err());
    }
}
