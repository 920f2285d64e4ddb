//! Safety checks applied before any Bitcoin funds move.
//!
//! EchoLock's timelock path is testnet-only until it has had a mainnet
//! economic-safety review, and it caps the amount any single switch
//! can lock even on testnet so a misconfiguration can't accidentally
//! become an expensive mistake once mainnet support does land.

use bitcoin::Network;
use thiserror::Error;

/// Hard cap on sats a single CLTV output may hold.
pub const MAX_TESTNET_AMOUNT_SATS: u64 = 1_000_000;

/// Minimum number of blocks the chain tip must sit past a locktime
/// before EchoLock will treat funds as spendable, guarding against
/// reorgs right at the boundary.
pub const MIN_BLOCKS_PAST_TIMELOCK: u32 = 10;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SafetyError {
    #[error("mainnet is not supported — EchoLock's timelock path is testnet-only")]
    MainnetNotSupported,
    #[error("amount {0} sats exceeds the safety cap of {MAX_TESTNET_AMOUNT_SATS} sats")]
    AmountExceedsCap(u64),
    #[error("tip height {tip} has not advanced {required} blocks past locktime {locktime}")]
    InsufficientConfirmationMargin {
        tip: u32,
        locktime: u32,
        required: u32,
    },
}

pub fn require_non_mainnet(network: Network) -> Result<(), SafetyError> {
    if network == Network::Bitcoin {
        return Err(SafetyError::MainnetNotSupported);
    }
    Ok(())
}

pub fn require_within_amount_cap(amount_sats: u64) -> Result<(), SafetyError> {
    if amount_sats > MAX_TESTNET_AMOUNT_SATS {
        return Err(SafetyError::AmountExceedsCap(amount_sats));
    }
    Ok(())
}

/// Spending a CLTV output is only considered safe once the chain tip
/// sits at least [`MIN_BLOCKS_PAST_TIMELOCK`] blocks past the
/// locktime height, absorbing the risk of a shallow reorg reverting
/// the chain to just before the timelock matured.
pub fn require_timelock_margin(tip_height: u32, locktime_height: u32) -> Result<(), SafetyError> {
    if tip_height < locktime_height + MIN_BLOCKS_PAST_TIMELOCK {
        return Err(SafetyError::InsufficientConfirmationMargin {
            tip: tip_height,
            locktime: locktime_height,
            required: MIN_BLOCKS_PAST_TIMELOCK,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mainnet_is_rejected() {
        assert!(require_non_mainnet(Network::Bitcoin).is_err());
        assert!(require_non_mainnet(Network::Testnet).is_ok());
    }

    #[test]
    fn amount_cap_enforced() {
        assert!(require_within_amount_cap(1_000_000).is_ok());
        assert!(require_within_amount_cap(1_000_001).is_err());
    }

    #[test]
    fn timelock_margin_enforced() {
        assert!(require_timelock_margin(800_010, 800_000).is_ok());
        assert!(require_timelock_margin(800_005, 800_000).is_err());
    }
}
