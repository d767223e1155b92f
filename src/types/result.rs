//! Scoring results returned to callers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

/// Round to a fixed number of decimal places for presentation
pub fn round_dp(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

fn serialize_rounded<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(round_dp(*value, 4))
}

/// Coarse risk bucket derived from the default probability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskTier {
    #[serde(rename = "Low Risk")]
    Low,
    #[serde(rename = "Medium Risk")]
    Medium,
    #[serde(rename = "High Risk")]
    High,
}

/// Action taken on the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Decision {
    #[serde(rename = "APPROVE")]
    Approve,
    #[serde(rename = "MANUAL REVIEW")]
    ManualReview,
    #[serde(rename = "REJECT")]
    Reject,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Approve => "APPROVE",
            Decision::ManualReview => "MANUAL REVIEW",
            Decision::Reject => "REJECT",
        }
    }
}

/// Which way a feature pushed the prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "INCREASES Risk")]
    IncreasesRisk,
    #[serde(rename = "REDUCES Risk")]
    ReducesRisk,
}

impl Direction {
    /// Positive contributions push toward default
    pub fn from_contribution(contribution: f64) -> Self {
        if contribution > 0.0 {
            Direction::IncreasesRisk
        } else {
            Direction::ReducesRisk
        }
    }
}

/// One ranked factor behind a decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplanationEntry {
    pub feature: String,
    /// Signed contribution, rounded to 4 decimal places
    pub impact: f64,
    pub direction: Direction,
}

/// Outcome of scoring one application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    /// Probability of default; serialized rounded to 4 decimal places
    #[serde(serialize_with = "serialize_rounded")]
    pub probability_default: f64,
    /// 0..=1000, higher is safer
    pub credit_score: u32,
    pub risk_tier: RiskTier,
    pub decision: Decision,
    pub top_factors: Vec<ExplanationEntry>,
}

/// Wire response: either a result or an error message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScoreResponse {
    Scored(ScoreResult),
    Failed { error: String },
}

impl ScoreResponse {
    pub fn is_scored(&self) -> bool {
        matches!(self, ScoreResponse::Scored(_))
    }
}

/// Batch output line for one submitted application
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredApplication {
    pub request_id: String,
    #[serde(rename = "SK_ID_CURR", skip_serializing_if = "Option::is_none")]
    pub sk_id_curr: Option<i64>,
    pub scored_at: DateTime<Utc>,
    #[serde(flatten)]
    pub response: ScoreResponse,
}

impl ScoredApplication {
    pub fn new(sk_id_curr: Option<i64>, response: ScoreResponse) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            sk_id_curr,
            scored_at: Utc::now(),
            response,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_result() -> ScoreResult {
        ScoreResult {
            probability_default: 0.073_412_9,
            credit_score: 927,
            risk_tier: RiskTier::Low,
            decision: Decision::Approve,
            top_factors: vec![ExplanationEntry {
                feature: "EXT_SOURCE_3".to_string(),
                impact: -0.4123,
                direction: Direction::ReducesRisk,
            }],
        }
    }

    #[test]
    fn test_round_dp() {
        assert_eq!(round_dp(0.073_412_9, 4), 0.0734);
        assert_eq!(round_dp(-0.412_349, 4), -0.4123);
        assert_eq!(round_dp(12.0, 4), 12.0);
    }

    #[test]
    fn test_direction_from_contribution() {
        assert_eq!(Direction::from_contribution(0.2), Direction::IncreasesRisk);
        assert_eq!(Direction::from_contribution(-0.2), Direction::ReducesRisk);
        assert_eq!(Direction::from_contribution(0.0), Direction::ReducesRisk);
    }

    #[test]
    fn test_wire_shape() {
        let value = serde_json::to_value(ScoreResponse::Scored(sample_result())).unwrap();

        assert_eq!(value["probability_default"], 0.0734);
        assert_eq!(value["credit_score"], 927);
        assert_eq!(value["risk_tier"], "Low Risk");
        assert_eq!(value["decision"], "APPROVE");
        assert_eq!(value["top_factors"][0]["feature"], "EXT_SOURCE_3");
        assert_eq!(value["top_factors"][0]["direction"], "REDUCES Risk");
    }

    #[test]
    fn test_failed_response_shape() {
        let response = ScoreResponse::Failed {
            error: "Validation error: bad".to_string(),
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value, serde_json::json!({ "error": "Validation error: bad" }));
    }

    #[test]
    fn test_scored_application_envelope() {
        let scored =
            ScoredApplication::new(Some(100002), ScoreResponse::Scored(sample_result()));
        let value = serde_json::to_value(&scored).unwrap();

        assert_eq!(value["SK_ID_CURR"], 100002);
        assert_eq!(value["decision"], "APPROVE");
        assert!(value["request_id"].as_str().is_some());
    }
}
