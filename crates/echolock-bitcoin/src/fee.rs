//! Fee estimation with a static fallback table.
//!
//! Esplora's `/fee-estimates` can be unreachable or briefly stale; when
//! it is, EchoLock falls back to a fixed table rather than failing the
//! whole broadcast attempt outright.

use crate::esplora::FeeEstimates;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeePriority {
    Fastest,
    HalfHour,
    Hour,
    Economy,
    Minimum,
}

impl FeePriority {
    /// Confirmation target in blocks used to look the rate up in the
    /// esplora fee-estimates map.
    fn target_blocks(self) -> &'static str {
        match self {
            FeePriority::Fastest => "1",
            FeePriority::HalfHour => "3",
            FeePriority::Hour => "6",
            FeePriority::Economy => "144",
            FeePriority::Minimum => "1008",
        }
    }

    fn fallback_sat_per_vb(self) -> f64 {
        match self {
            FeePriority::Fastest => 20.0,
            FeePriority::HalfHour => 10.0,
            FeePriority::Hour => 5.0,
            FeePriority::Economy => 2.0,
            FeePriority::Minimum => 1.0,
        }
    }
}

/// Resolve a sat/vB rate for `priority`, preferring the live esplora
/// estimates and falling back to the static table for any target the
/// server didn't report.
pub fn resolve_fee_rate(estimates: Option<&FeeEstimates>, priority: FeePriority) -> f64 {
    if let Some(estimates) = estimates {
        if let Some(&rate) = estimates.targets.get(priority.target_blocks()) {
            return rate;
        }
    }
    priority.fallback_sat_per_vb()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn falls_back_when_no_estimates_available() {
        let rate = resolve_fee_rate(None, FeePriority::Hour);
        assert_eq!(rate, FeePriority::Hour.fallback_sat_per_vb());
    }

    #[test]
    fn prefers_live_estimate_when_present() {
        let mut targets = BTreeMap::new();
        targets.insert("6".to_string(), 42.0);
        let estimates = FeeEstimates { targets };
        assert_eq!(resolve_fee_rate(Some(&estimates), FeePriority::Hour), 42.0);
    }

    #[test]
    fn falls_back_for_missing_target_in_live_estimates() {
        let estimates = FeeEstimates {
            targets: BTreeMap::new(),
        };
        let rate = resolve_fee_rate(Some(&estimates), FeePriority::Fastest);
        assert_eq!(rate, FeePriority::Fastest.fallback_sat_per_vb());
    }

    #[test]
    fn priority_ordering_is_monotonic_in_fallback_table() {
        assert!(FeePriority::Fastest.fallback_sat_per_vb() > FeePriority::HalfHour.fallback_sat_per_vb());
        assert!(FeePriority::HalfHour.fallback_sat_per_vb() > FeePriority::Hour.fallback_sat_per_vb());
        assert!(FeePriority::Hour.fallback_sat_per_vb() > FeePriority::Economy.fallback_sat_per_vb());
        assert!(FeePriority::Economy.fallback_sat_per_vb() > FeePriority::Minimum.fallback_sat_per_vb());
    }
}
