//! Strength checks for the HMAC signing secrets and the password pepper.

use anyhow::{anyhow, Result};
use tracing::warn;

const MIN_SECRET_LENGTH: usize = 32;
const RECOMMENDED_SECRET_LENGTH: usize = 64;
const MIN_ENTROPY_BITS: f64 = 4.0;
const STRONG_ENTROPY_BITS: f64 = 5.0;
const RUN_LIMIT: usize = 4;

#[derive(Debug, PartialEq, Eq)]
pub enum SecretStrength {
    Weak,
    Acceptable,
    Strong,
}

/// Classify a secret by length, Shannon entropy and obvious runs.
pub fn validate_secret_strength(secret: &str) -> SecretStrength {
    let bytes = secret.as_bytes();

    if bytes.len() < MIN_SECRET_LENGTH {
        return SecretStrength::Weak;
    }

    let entropy = shannon_entropy(bytes);
    if entropy < MIN_ENTROPY_BITS || has_runs(bytes) {
        return SecretStrength::Weak;
    }

    if bytes.len() >= RECOMMENDED_SECRET_LENGTH && entropy >= STRONG_ENTROPY_BITS {
        SecretStrength::Strong
    } else {
        SecretStrength::Acceptable
    }
}

/// Reject weak secrets at startup; acceptable ones only warn.
pub fn ensure_secret_strength(name: &str, secret: &str) -> Result<SecretStrength> {
    match validate_secret_strength(secret) {
        SecretStrength::Weak => Err(anyhow!(
            "{} is too weak: use at least {} random bytes",
            name,
            MIN_SECRET_LENGTH
        )),
        SecretStrength::Acceptable => {
            warn!(secret = name, "secret is acceptable but shorter than recommended");
            Ok(SecretStrength::Acceptable)
        }
        SecretStrength::Strong => Ok(SecretStrength::Strong),
    }
}

/// Bits per byte, 0..=8.
fn shannon_entropy(data: &[u8]) -> f64 {
    let mut freq = [0u32; 256];
    for &byte in data {
        freq[byte as usize] += 1;
    }

    let len = data.len() as f64;
    freq.iter()
        .filter(|&&count| count > 0)
        .map(|&count| {
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Four or more repeated bytes ("aaaa") or ascending bytes ("1234").
fn has_runs(data: &[u8]) -> bool {
    let mut same = 1;
    let mut ascending = 1;
    for pair in data.windows(2) {
        same = if pair[0] == pair[1] { same + 1 } else { 1 };
        ascending = if pair[1] as i16 - pair[0] as i16 == 1 {
            ascending + 1
        } else {
            1
        };
        if same >= RUN_LIMIT || ascending >= RUN_LIMIT {
            return true;
        }
    }
    false
}
