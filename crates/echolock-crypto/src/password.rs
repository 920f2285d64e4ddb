//! Password strength estimation.
//!
//! Advisory only — `cipher::encrypt` never refuses a non-empty password
//! on strength grounds, it only rejects the empty string. This exists
//! so callers (the CLI, the server's switch-creation path) can warn a
//! user before they lock a secret behind a weak password.

const COMMON_PASSWORDS: &[&str] = &[
    "password", "123456", "12345678", "qwerty", "letmein", "admin",
    "welcome", "monkey", "dragon", "master", "abc123", "football",
    "iloveyou", "trustno1", "sunshine", "princess", "shadow",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PasswordStrength {
    Dangerous,
    Weak,
    Fair,
    Strong,
    Excellent,
}

#[derive(Debug, Clone)]
pub struct PasswordAnalysis {
    pub strength: PasswordStrength,
    pub estimated_bits: f64,
    pub is_common: bool,
}

/// Estimate entropy in bits from character-class diversity and length,
/// then apply penalties for common passwords, repeated characters, and
/// simple sequences. This is a heuristic, not a cryptographic measure.
pub fn estimate_entropy(password: &str) -> PasswordAnalysis {
    let len = password.chars().count();
    if len == 0 {
        return PasswordAnalysis {
            strength: PasswordStrength::Dangerous,
            estimated_bits: 0.0,
            is_common: false,
        };
    }

    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_symbol = password.chars().any(|c| !c.is_ascii_alphanumeric());
    let has_space = password.contains(' ');

    let mut pool_size: f64 = 0.0;
    if has_lower {
        pool_size += 26.0;
    }
    if has_upper {
        pool_size += 26.0;
    }
    if has_digit {
        pool_size += 10.0;
    }
    if has_symbol {
        pool_size += 32.0;
    }
    if pool_size == 0.0 {
        pool_size = 1.0;
    }

    let mut bits = len as f64 * pool_size.log2();

    // Passphrase bonus: multi-word inputs carry more entropy per
    // character than the raw character-class estimate suggests.
    if has_space && password.split_whitespace().count() >= 3 {
        bits *= 1.15;
    }

    let is_common = COMMON_PASSWORDS
        .iter()
        .any(|&p| password.eq_ignore_ascii_case(p));
    if is_common {
        bits = bits.min(10.0);
    }

    if has_repeated_run(password, 4) {
        bits *= 0.6;
    }
    if has_sequential_run(password, 4) {
        bits *= 0.7;
    }

    let strength = if is_common || bits < 28.0 {
        PasswordStrength::Dangerous
    } else if bits < 40.0 {
        PasswordStrength::Weak
    } else if bits < 60.0 {
        PasswordStrength::Fair
    } else if bits < 80.0 {
        PasswordStrength::Strong
    } else {
        PasswordStrength::Excellent
    };

    PasswordAnalysis {
        strength,
        estimated_bits: bits,
        is_common,
    }
}

fn has_repeated_run(s: &str, run_len: usize) -> bool {
    let chars: Vec<char> = s.chars().collect();
    chars
        .windows(run_len)
        .any(|w| w.iter().all(|&c| c == w[0]))
}

fn has_sequential_run(s: &str, run_len: usize) -> bool {
    let bytes: Vec<u8> = s.bytes().collect();
    bytes.windows(run_len).any(|w| {
        w.windows(2).all(|p| p[1] == p[0].wrapping_add(1))
            || w.windows(2).all(|p| p[1] == p[0].wrapping_sub(1))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_dangerous() {
        assert_eq!(estimate_entropy("").strength, PasswordStrength::Dangerous);
    }

    #[test]
    fn common_password_is_dangerous() {
        assert_eq!(
            estimate_entropy("password").strength,
            PasswordStrength::Dangerous
        );
    }

    #[test]
    fn long_random_passphrase_is_strong_or_better() {
        let analysis = estimate_entropy("correct horse battery staple zebra");
        assert!(analysis.strength >= PasswordStrength::Strong);
    }

    #[test]
    fn repeated_chars_penalized() {
        let repeated = estimate_entropy("aaaaaaaaaaaa");
        let mixed = estimate_entropy("xQ7!mR2@zL9#");
        assert!(repeated.estimated_bits < mixed.estimated_bits);
    }

    #[test]
    fn sequential_run_penalized() {
        let sequential = estimate_entropy("abcdefgh1234");
        assert!(has_sequential_run("abcdefgh1234", 4));
        let _ = sequential;
    }
}
