//! Threshold splitting with per-share HMAC-SHA256 authentication.
//!
//! Bare Shamir shares give no way to tell a corrupted or malicious
//! share from a legitimate one short-of-threshold shares — combining
//! a bad share with good ones just silently reconstructs garbage.
//! Each [`AuthenticatedShare`] therefore carries a MAC over its own
//! index and data, keyed with a separate `auth_key` generated at split
//! time and distributed alongside the shares out of band. Combining
//! rejects any share whose MAC doesn't verify before interpolation
//! ever runs.

use crate::gf256::{lagrange_interpolate, poly_eval};
use crate::ShamirError;
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const AUTH_KEY_LEN: usize = 32;
pub const MAC_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedShare {
    /// 1..=total, never 0.
    pub index: u8,
    pub data: Vec<u8>,
    pub mac: [u8; MAC_LEN],
}

pub struct SplitResult {
    pub shares: Vec<AuthenticatedShare>,
    pub auth_key: [u8; AUTH_KEY_LEN],
}

fn compute_mac(auth_key: &[u8; AUTH_KEY_LEN], index: u8, data: &[u8]) -> [u8; MAC_LEN] {
    let mut mac = HmacSha256::new_from_slice(auth_key).expect("HMAC accepts any key length");
    mac.update(&[index]);
    mac.update(data);
    let result = mac.finalize().into_bytes();
    let mut out = [0u8; MAC_LEN];
    out.copy_from_slice(&result);
    out
}

fn verify_mac(auth_key: &[u8; AUTH_KEY_LEN], share: &AuthenticatedShare) -> bool {
    let mut mac = HmacSha256::new_from_slice(auth_key).expect("HMAC accepts any key length");
    mac.update(&[share.index]);
    mac.update(&share.data);
    mac.verify_slice(&share.mac).is_ok()
}

/// Split `secret` into `total` authenticated shares, any `threshold` of
/// which reconstruct it.
pub fn split_secret(
    secret: &[u8],
    threshold: u8,
    total: u8,
) -> Result<SplitResult, ShamirError> {
    if threshold < 2 {
        return Err(ShamirError::InvalidThreshold);
    }
    if threshold > total {
        return Err(ShamirError::ThresholdExceedsShares);
    }
    if secret.is_empty() {
        return Err(ShamirError::InvalidShare("empty secret".into()));
    }

    let mut rng = rand::thread_rng();

    let mut auth_key = [0u8; AUTH_KEY_LEN];
    rng.fill_bytes(&mut auth_key);

    let mut raw: Vec<(u8, Vec<u8>)> = (1..=total).map(|i| (i, Vec::with_capacity(secret.len()))).collect();

    for &secret_byte in secret {
        let mut coefficients = vec![secret_byte];
        for _ in 1..threshold {
            let mut b = [0u8];
            rng.fill_bytes(&mut b);
            coefficients.push(b[0]);
        }
        for (index, data) in raw.iter_mut() {
            data.push(poly_eval(&coefficients, *index));
        }
    }

    let shares = raw
        .into_iter()
        .map(|(index, data)| {
            let mac = compute_mac(&auth_key, index, &data);
            AuthenticatedShare { index, data, mac }
        })
        .collect();

    Ok(SplitResult { shares, auth_key })
}

/// Verify every share's MAC under `auth_key`, then reconstruct via
/// Lagrange interpolation. A failing MAC reports the offending index
/// rather than silently producing a wrong secret. Fails fast with
/// `InsufficientShares` if fewer than `threshold` shares are supplied,
/// before any MAC verification or interpolation runs — below
/// threshold, interpolation "succeeds" numerically but yields the
/// wrong secret, so the check has to happen here rather than be left
/// to the caller.
pub fn combine_shares(
    shares: &[AuthenticatedShare],
    auth_key: &[u8; AUTH_KEY_LEN],
    threshold: u8,
) -> Result<Vec<u8>, ShamirError> {
    if shares.len() < threshold as usize {
        return Err(ShamirError::InsufficientShares);
    }

    let mut seen = std::collections::BTreeSet::new();
    for share in shares {
        if !seen.insert(share.index) {
            return Err(ShamirError::DuplicateIndex(share.index));
        }
    }

    let secret_len = shares[0].data.len();
    for share in shares {
        if share.data.len() != secret_len {
            return Err(ShamirError::InvalidShare(
                "shares have inconsistent lengths".into(),
            ));
        }
        if !verify_mac(auth_key, share) {
            return Err(ShamirError::ShareInvalid(share.index));
        }
    }

    let mut secret = Vec::with_capacity(secret_len);
    for byte_idx in 0..secret_len {
        let points: Vec<(u8, u8)> = shares.iter().map(|s| (s.index, s.data[byte_idx])).collect();
        secret.push(lagrange_interpolate(&points));
    }
    Ok(secret)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_and_combine_2_of_3() {
        let secret = b"Hello, EchoLock!";
        let result = split_secret(secret, 2, 3).unwrap();
        assert_eq!(result.shares.len(), 3);

        let recovered = combine_shares(&result.shares[0..2], &result.auth_key, 2).unwrap();
        assert_eq!(recovered, secret);
        let recovered = combine_shares(&result.shares[1..3], &result.auth_key, 2).unwrap();
        assert_eq!(recovered, secret);
    }

    #[test]
    fn split_and_combine_3_of_5_non_consecutive() {
        let secret = b"A longer secret message for a 3-of-5 split";
        let result = split_secret(secret, 3, 5).unwrap();
        let subset = vec![
            result.shares[0].clone(),
            result.shares[2].clone(),
            result.shares[4].clone(),
        ];
        let recovered = combine_shares(&subset, &result.auth_key, 3).unwrap();
        assert_eq!(recovered, secret);
    }

    #[test]
    fn tampered_share_is_rejected_before_interpolation() {
        let secret = b"do not trust a tampered share";
        let result = split_secret(secret, 2, 3).unwrap();
        let mut shares = result.shares[0..2].to_vec();
        shares[0].data[0] ^= 0x01;

        match combine_shares(&shares, &result.auth_key, 2) {
            Err(ShamirError::ShareInvalid(idx)) => assert_eq!(idx, shares[0].index),
            other => panic!("expected ShareInvalid, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_index_is_rejected() {
        let secret = b"dup index";
        let result = split_secret(secret, 2, 3).unwrap();
        let shares = vec![result.shares[0].clone(), result.shares[0].clone()];
        assert!(matches!(
            combine_shares(&shares, &result.auth_key, 2),
            Err(ShamirError::DuplicateIndex(_))
        ));
    }

    #[test]
    fn fewer_than_threshold_shares_is_rejected_before_interpolation() {
        let secret = b"test";
        let result = split_secret(secret, 3, 5).unwrap();
        assert!(matches!(
            combine_shares(&result.shares[0..2], &result.auth_key, 3),
            Err(ShamirError::InsufficientShares)
        ));
    }

    #[test]
    fn invalid_threshold_rejected() {
        assert!(matches!(
            split_secret(b"test", 1, 3),
            Err(ShamirError::InvalidThreshold)
        ));
        assert!(matches!(
            split_secret(b"test", 5, 3),
            Err(ShamirError::ThresholdExceedsShares)
        ));
    }

    #[test]
    fn wrong_auth_key_rejects_all_shares() {
        let secret = b"wrong key test";
        let result = split_secret(secret, 2, 3).unwrap();
        let wrong_key = [0xAAu8; AUTH_KEY_LEN];
        assert!(matches!(
            combine_shares(&result.shares[0..2], &wrong_key, 2),
            Err(ShamirError::ShareInvalid(_))
        ));
    }

    #[test]
    fn share_indices_are_sequential_from_one() {
        let result = split_secret(b"test", 2, 5).unwrap();
        for (i, share) in result.shares.iter().enumerate() {
            assert_eq!(share.index, (i + 1) as u8);
        }
    }
}
