//! # Comparator Module
//!
//! Bit distance between fingerprints and the duplicate decision built on it.
//!
//! ## Comparability
//! Two fingerprints are compared only when their bit widths agree and, if
//! both carry a scheme tag, the tags agree. Anything else is
//! [`CompareError::Incomparable`] and never a match.
//!
//! ## Comparison Thresholds
//! | Distance | Classification |
//! |----------|---------------|
//! | 0        | Exact match   |
//! | 1-4      | Near-exact    |
//! | 5-10     | Similar       |
//! | 11+      | Different     |

mod traits;

pub use traits::{ComparisonStrategy, ThresholdStrategy};

use crate::core::hasher::Fingerprint;
use crate::error::CompareError;
use serde::{Deserialize, Serialize};

/// Number of differing bits between two comparable fingerprints.
///
/// Padding bits are always zero, so XOR over the hex digits counts only
/// real bits.
pub fn distance(a: &Fingerprint, b: &Fingerprint) -> Result<u32, CompareError> {
    if !a.is_comparable_with(b) {
        return Err(CompareError::Incomparable {
            left: a.to_string(),
            left_bits: a.bit_count(),
            right: b.to_string(),
            right_bits: b.bit_count(),
        });
    }

    let bits = a
        .hex()
        .bytes()
        .zip(b.hex().bytes())
        .map(|(x, y)| (nibble(x) ^ nibble(y)).count_ones())
        .sum();

    Ok(bits)
}

/// Whether `a` and `b` are within `threshold` bits (inclusive).
///
/// Incomparable pairs are never a match.
pub fn is_match(a: &Fingerprint, b: &Fingerprint, threshold: u32) -> bool {
    matches!(distance(a, b), Ok(d) if d <= threshold)
}

fn nibble(digit: u8) -> u8 {
    // Fingerprint parsing guarantees lowercase hex
    match digit {
        b'0'..=b'9' => digit - b'0',
        b'a'..=b'f' => digit - b'a' + 10,
        _ => 0,
    }
}

/// Result of comparing two fingerprints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Hamming distance between the fingerprints
    pub distance: u32,
    /// Similarity as a percentage of the bit width (0-100)
    pub similarity_percent: f64,
    /// Classification of the match
    pub match_type: MatchType,
}

impl MatchResult {
    /// Compare two fingerprints and classify the result
    pub fn compare(a: &Fingerprint, b: &Fingerprint) -> Result<Self, CompareError> {
        let distance = distance(a, b)?;
        let width = a.bit_count().max(1);
        Ok(Self {
            distance,
            similarity_percent: (1.0 - f64::from(distance) / f64::from(width)) * 100.0,
            match_type: MatchType::from_distance(distance),
        })
    }
}

/// Classification of match types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchType {
    /// Distance = 0, identical perceptual content
    Exact,
    /// Distance 1-4, virtually identical
    NearExact,
    /// Distance 5-10, likely the same media re-encoded or resized
    Similar,
    /// Distance 11+
    Different,
}

impl MatchType {
    /// Classify based on Hamming distance
    pub fn from_distance(distance: u32) -> Self {
        match distance {
            0 => MatchType::Exact,
            1..=4 => MatchType::NearExact,
            5..=10 => MatchType::Similar,
            _ => MatchType::Different,
        }
    }
}

impl std::fmt::Display for MatchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchType::Exact => write!(f, "Exact Match"),
            MatchType::NearExact => write!(f, "Near-Exact Match"),
            MatchType::Similar => write!(f, "Similar"),
            MatchType::Different => write!(f, "Different"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(text: &str) -> Fingerprint {
        Fingerprint::parse(text).unwrap()
    }

    #[test]
    fn distance_to_self_is_zero() {
        let a = fp("dct8:7a3c91e4b2d05f18");
        assert_eq!(distance(&a, &a).unwrap(), 0);
    }

    #[test]
    fn distance_is_symmetric() {
        let a = fp("mean8:ff00ff00ff00ff00");
        let b = fp("mean8:0f00ff00ff00ff01");
        assert_eq!(distance(&a, &b).unwrap(), distance(&b, &a).unwrap());
    }

    #[test]
    fn flipping_k_bits_gives_distance_k() {
        let a = fp("mean8:0000000000000000");
        // 0x7 = 3 bits, 0x1 = 1 bit, 0xf = 4 bits
        let b = fp("mean8:7000000100000f00");
        assert_eq!(distance(&a, &b).unwrap(), 8);
    }

    #[test]
    fn threshold_is_inclusive() {
        let a = fp("mean8:0000000000000000");
        let b = fp("mean8:000000000000001f");

        assert!(is_match(&a, &b, 5));
        assert!(!is_match(&a, &b, 4));
    }

    #[test]
    fn different_widths_are_incomparable() {
        let short = fp("00ff");
        let long = fp("000000ff");

        assert!(matches!(
            distance(&short, &long),
            Err(CompareError::Incomparable { left_bits: 16, right_bits: 32, .. })
        ));
        assert!(!is_match(&short, &long, 64));
    }

    #[test]
    fn different_schemes_are_incomparable() {
        // Same hex length, different bit widths and tags
        let dct = fp("dct8:0000000000000000");
        let mean = fp("mean8:0000000000000000");

        assert!(distance(&dct, &mean).is_err());
        assert!(!is_match(&dct, &mean, 64));
    }

    #[test]
    fn untagged_compares_with_same_width_tag() {
        let legacy = fp("ffffffffffffffff");
        let mean = fp("mean8:fffffffffffffffe");

        assert_eq!(distance(&legacy, &mean).unwrap(), 1);
    }

    #[test]
    fn match_result_reports_similarity() {
        let a = fp("mean8:0000000000000000");
        let b = fp("mean8:00000000000000ff");

        let result = MatchResult::compare(&a, &b).unwrap();
        assert_eq!(result.distance, 8);
        assert_eq!(result.match_type, MatchType::Similar);
        assert!((result.similarity_percent - 87.5).abs() < 1e-9);
    }

    #[test]
    fn classify_boundaries() {
        assert_eq!(MatchType::from_distance(0), MatchType::Exact);
        assert_eq!(MatchType::from_distance(4), MatchType::NearExact);
        assert_eq!(MatchType::from_distance(10), MatchType::Similar);
        assert_eq!(MatchType::from_distance(11), MatchType::Different);
    }
}
