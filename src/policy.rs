//! Mapping from default probability to score, tier and decision

use crate::types::result::{Decision, RiskTier};
use serde::{Deserialize, Serialize};

/// Probability cut-offs between tiers.
///
/// A probability equal to a cut-off belongs to the higher tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecisionThresholds {
    /// Lowest probability sent to manual review
    pub review_threshold: f64,
    /// Lowest probability rejected
    pub reject_threshold: f64,
}

impl Default for DecisionThresholds {
    fn default() -> Self {
        Self {
            review_threshold: 0.20,
            reject_threshold: 0.50,
        }
    }
}

impl DecisionThresholds {
    pub fn is_valid(&self) -> bool {
        0.0 <= self.review_threshold
            && self.review_threshold <= self.reject_threshold
            && self.reject_threshold <= 1.0
    }
}

impl RiskTier {
    /// Determine tier from probability and thresholds
    pub fn from_probability(probability: f64, thresholds: &DecisionThresholds) -> Self {
        if probability < thresholds.review_threshold {
            RiskTier::Low
        } else if probability < thresholds.reject_threshold {
            RiskTier::Medium
        } else {
            RiskTier::High
        }
    }

    pub fn decision(&self) -> Decision {
        match self {
            RiskTier::Low => Decision::Approve,
            RiskTier::Medium => Decision::ManualReview,
            RiskTier::High => Decision::Reject,
        }
    }
}

/// Outcome of the decision policy for one probability
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolicyOutcome {
    pub credit_score: u32,
    pub risk_tier: RiskTier,
    pub decision: Decision,
}

/// Pure mapping from probability of default to an action
#[derive(Debug, Clone, Copy, Default)]
pub struct DecisionPolicy {
    thresholds: DecisionThresholds,
}

impl DecisionPolicy {
    pub fn new(thresholds: DecisionThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &DecisionThresholds {
        &self.thresholds
    }

    pub fn decide(&self, probability: f64) -> PolicyOutcome {
        let risk_tier = RiskTier::from_probability(probability, &self.thresholds);
        PolicyOutcome {
            credit_score: credit_score(probability),
            risk_tier,
            decision: risk_tier.decision(),
        }
    }
}

/// `round((1 - p) * 1000)` clamped to 0..=1000
pub fn credit_score(probability: f64) -> u32 {
    ((1.0 - probability) * 1000.0).round().clamp(0.0, 1000.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_example() {
        let outcome = DecisionPolicy::default().decide(0.0734);

        assert_eq!(outcome.credit_score, 927);
        assert_eq!(outcome.risk_tier, RiskTier::Low);
        assert_eq!(outcome.decision, Decision::Approve);
    }

    #[test]
    fn test_tier_boundaries() {
        let policy = DecisionPolicy::default();

        assert_eq!(policy.decide(0.199_999).risk_tier, RiskTier::Low);
        assert_eq!(policy.decide(0.2).risk_tier, RiskTier::Medium);
        assert_eq!(policy.decide(0.499_999).risk_tier, RiskTier::Medium);
        assert_eq!(policy.decide(0.5).risk_tier, RiskTier::High);
        assert_eq!(policy.decide(0.5).decision, Decision::Reject);
        assert_eq!(policy.decide(0.3).decision, Decision::ManualReview);
    }

    #[test]
    fn test_score_endpoints() {
        assert_eq!(credit_score(0.0), 1000);
        assert_eq!(credit_score(1.0), 0);
        assert_eq!(credit_score(0.5), 500);
    }

    #[test]
    fn test_score_monotonic() {
        let mut previous = credit_score(0.0);
        for step in 1..=10_000 {
            let score = credit_score(step as f64 / 10_000.0);
            assert!(score <= previous, "score rose at step {step}");
            previous = score;
        }
    }

    #[test]
    fn test_custom_thresholds() {
        let thresholds = DecisionThresholds {
            review_threshold: 0.1,
            reject_threshold: 0.3,
        };
        assert!(thresholds.is_valid());
        assert_eq!(DecisionPolicy::new(thresholds).decide(0.15).risk_tier, RiskTier::Medium);

        let inverted = DecisionThresholds {
            review_threshold: 0.6,
            reject_threshold: 0.3,
        };
        assert!(!inverted.is_valid());
    }
}
