//! Duplicate decision strategies.

use super::MatchResult;
use crate::core::hasher::Fingerprint;

/// Decides whether a stored fingerprint duplicates a query
pub trait ComparisonStrategy: Send + Sync {
    /// Largest distance still treated as a duplicate (inclusive)
    fn threshold(&self) -> u32;

    /// Compare `query` against `stored`.
    ///
    /// `None` when the pair is incomparable or too far apart.
    fn evaluate(&self, query: &Fingerprint, stored: &Fingerprint) -> Option<MatchResult> {
        MatchResult::compare(query, stored)
            .ok()
            .filter(|result| result.distance <= self.threshold())
    }
}

/// Fixed maximum-distance strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdStrategy {
    threshold: u32,
}

impl ThresholdStrategy {
    /// Thresholds for 63/64-bit fingerprints:
    /// - 5: conservative
    /// - 8: balanced
    /// - 10: permissive, catches re-encoded and resized copies (default)
    pub fn new(threshold: u32) -> Self {
        Self { threshold }
    }

    pub fn conservative() -> Self {
        Self::new(5)
    }

    pub fn balanced() -> Self {
        Self::new(8)
    }

    pub fn permissive() -> Self {
        Self::new(10)
    }
}

impl Default for ThresholdStrategy {
    fn default() -> Self {
        Self::permissive()
    }
}

impl ComparisonStrategy for ThresholdStrategy {
    fn threshold(&self) -> u32 {
        self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(text: &str) -> Fingerprint {
        Fingerprint::parse(text).unwrap()
    }

    #[test]
    fn threshold_is_inclusive() {
        let strategy = ThresholdStrategy::new(5);
        let query = fp("mean8:0000000000000000");

        assert!(strategy.evaluate(&query, &fp("mean8:000000000000001f")).is_some());
        assert!(strategy.evaluate(&query, &fp("mean8:000000000000003f")).is_none());
    }

    #[test]
    fn incomparable_pairs_never_match() {
        let strategy = ThresholdStrategy::new(64);

        let result = strategy.evaluate(
            &fp("mean8:0000000000000000"),
            &fp("dct8:0000000000000000"),
        );

        assert!(result.is_none());
    }

    #[test]
    fn presets() {
        assert_eq!(ThresholdStrategy::conservative().threshold(), 5);
        assert_eq!(ThresholdStrategy::balanced().threshold(), 8);
        assert_eq!(ThresholdStrategy::default(), ThresholdStrategy::permissive());
    }
}
