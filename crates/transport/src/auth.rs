//! Constant-time device token comparison.
//!
//! Hashing first normalizes both inputs to 32 bytes so the subsequent
//! `ct_eq` always compares a fixed-size buffer regardless of the
//! caller-supplied token's length — timing leaks one less bit of
//! information than comparing raw strings of unequal length would.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

pub fn token_eq(a: &str, b: &str) -> bool {
    let ha = Sha256::digest(a.as_bytes());
    let hb = Sha256::digest(b.as_bytes());
    ha.ct_eq(&hb).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_tokens_match() {
        assert!(token_eq("secret-token", "secret-token"));
    }

    #[test]
    fn different_tokens_do_not_match() {
        assert!(!token_eq("secret-token", "wrong-token"));
    }

    #[test]
    fn different_length_tokens_do_not_match() {
        assert!(!token_eq("short", "a-much-longer-token-value"));
    }
}
