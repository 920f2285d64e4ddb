//! Authenticated Shamir's Secret Sharing.
//!
//! Splits a secret into N shares over GF(256), any M of which
//! reconstruct it, with each share carrying an HMAC-SHA256 tag so a
//! corrupted or substituted share is caught before interpolation runs.

pub mod authenticated;
pub mod gf256;

pub use authenticated::{combine_shares, split_secret, AuthenticatedShare, SplitResult};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShamirError {
    #[error("threshold must be at least 2")]
    InvalidThreshold,
    #[error("threshold exceeds total share count")]
    ThresholdExceedsShares,
    #[error("not enough shares to reconstruct")]
    InsufficientShares,
    #[error("duplicate share index: {0}")]
    DuplicateIndex(u8),
    #[error("share {0} failed authentication")]
    ShareInvalid(u8),
    #[error("invalid share: {0}")]
    InvalidShare(String),
}

/// Common threshold configuration, validated up front.
#[derive(Debug, Clone, Copy)]
pub struct ShamirConfig {
    pub threshold: u8,
    pub total_shares: u8,
}

impl ShamirConfig {
    pub fn new(threshold: u8, total_shares: u8) -> Result<Self, ShamirError> {
        let config = Self {
            threshold,
            total_shares,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ShamirError> {
        if self.threshold < 2 {
            return Err(ShamirError::InvalidThreshold);
        }
        if self.threshold > self.total_shares {
            return Err(ShamirError::ThresholdExceedsShares);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_validates_threshold_bounds() {
        assert!(ShamirConfig::new(2, 3).is_ok());
        assert!(ShamirConfig::new(1, 3).is_err());
        assert!(ShamirConfig::new(5, 3).is_err());
    }
}
