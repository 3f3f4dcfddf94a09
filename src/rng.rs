//! Seeded random sources
//!
//! Generation and rebalancing never touch ambient randomness; callers pass
//! an explicit generator so that every party can reproduce the same
//! reference set from the same seed.

use rand::rngs::StdRng;
use rand::SeedableRng;
use sha2::{Digest, Sha256};

/// Deterministic generator from a numeric seed.
pub fn seeded(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Deterministic generator from a shared secret phrase.
///
/// The phrase is hashed with SHA-256 and the digest is used as the full
/// 32-byte seed.
///
/// # Examples
///
/// ```
/// use rand::Rng;
/// use rse::rng::from_phrase;
///
/// let a: u64 = from_phrase("correct horse").gen();
/// let b: u64 = from_phrase("correct horse").gen();
/// assert_eq!(a, b);
/// ```
pub fn from_phrase(phrase: &str) -> StdRng {
    let digest = Sha256::digest(phrase.as_bytes());
    let mut seed = [0u8; 32];
    seed.copy_from_slice(&digest);
    StdRng::from_seed(seed)
}

/// Generator for an optional seed; unseeded runs draw from OS entropy.
pub fn from_option(seed: Option<u64>, phrase: Option<&str>) -> StdRng {
    match (phrase, seed) {
        (Some(p), _) => from_phrase(p),
        (None, Some(s)) => seeded(s),
        (None, None) => StdRng::from_entropy(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn phrases_differ() {
        let a: u64 = from_phrase("alpha").gen();
        let b: u64 = from_phrase("beta").gen();
        assert_ne!(a, b);
    }

    #[test]
    fn phrase_takes_precedence() {
        let a: u64 = from_option(Some(7), Some("p")).gen();
        let b: u64 = from_phrase("p").gen();
        assert_eq!(a, b);
        let c: u64 = from_option(Some(7), None).gen();
        let d: u64 = seeded(7).gen();
        assert_eq!(c, d);
    }
}
