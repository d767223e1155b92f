//! Per-prediction feature attribution and ranking

use crate::error::{Result, ScoringError};
use crate::models::inference::Classifier;
use crate::models::loader::LoadedModel;
use crate::schema::FeatureVector;
use crate::types::result::{round_dp, Direction, ExplanationEntry};
use ort::value::Tensor;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Most factors reported per decision, and the default
pub const DEFAULT_TOP_K: usize = 5;

/// Per-instance additive feature contributions for the trained classifier.
///
/// Positive values push the prediction toward default.
pub trait Attributor: Send + Sync {
    fn contributions(&self, features: &FeatureVector) -> Result<Vec<f64>>;
}

/// Contribution model exported alongside the classifier.
///
/// Output is `[1, n]` or `[1, n + 1]` with the bias term last.
pub struct OnnxAttributor {
    model: Mutex<LoadedModel>,
}

impl OnnxAttributor {
    pub fn new(model: LoadedModel) -> Self {
        Self {
            model: Mutex::new(model),
        }
    }
}

impl Attributor for OnnxAttributor {
    fn contributions(&self, features: &FeatureVector) -> Result<Vec<f64>> {
        let shape = vec![1_i64, features.len() as i64];
        let input_tensor = Tensor::from_array((shape, features.to_f32()))?;

        let mut model = self
            .model
            .lock()
            .map_err(|e| ScoringError::inference(format!("Lock error: {e}")))?;
        let model = &mut *model;

        let outputs = model
            .session
            .run(ort::inputs![&model.input_name => input_tensor])?;
        let output = outputs.get(&model.output_name).ok_or_else(|| {
            ScoringError::inference(format!("missing output '{}'", model.output_name))
        })?;
        let (_, data) = output.try_extract_tensor::<f32>()?;

        if data.len() < features.len() {
            return Err(ScoringError::inference(format!(
                "contribution model returned {} values for {} features",
                data.len(),
                features.len()
            )));
        }

        Ok(data[..features.len()].iter().map(|&v| v as f64).collect())
    }
}

/// Attribution by occlusion through the classifier itself.
///
/// Each feature's contribution is the change in log-odds when it is
/// replaced by the baseline (the schema fill value).
pub struct OcclusionAttributor {
    classifier: Arc<dyn Classifier>,
    baseline: f64,
}

impl OcclusionAttributor {
    pub fn new(classifier: Arc<dyn Classifier>, baseline: f64) -> Self {
        Self {
            classifier,
            baseline,
        }
    }
}

fn log_odds(probability: f64) -> f64 {
    let p = probability.clamp(1e-12, 1.0 - 1e-12);
    (p / (1.0 - p)).ln()
}

impl Attributor for OcclusionAttributor {
    fn contributions(&self, features: &FeatureVector) -> Result<Vec<f64>> {
        let full = log_odds(self.classifier.predict_proba(features)?);

        features
            .values()
            .iter()
            .enumerate()
            .map(|(index, &value)| {
                if value == self.baseline {
                    return Ok(0.0);
                }
                let occluded = features.with_value(index, self.baseline);
                Ok(full - log_odds(self.classifier.predict_proba(&occluded)?))
            })
            .collect()
    }
}

/// Ranks contributions into the factors reported with a decision
#[derive(Clone)]
pub struct ExplanationEngine {
    attributor: Arc<dyn Attributor>,
    top_k: usize,
}

impl ExplanationEngine {
    pub fn new(attributor: Arc<dyn Attributor>) -> Self {
        Self {
            attributor,
            top_k: DEFAULT_TOP_K,
        }
    }

    /// Report at most `top_k` factors, never more than [`DEFAULT_TOP_K`]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.min(DEFAULT_TOP_K);
        self
    }

    /// Top factors by descending absolute contribution.
    ///
    /// Equal magnitudes keep schema order. Non-finite contributions are
    /// not ranked.
    pub fn explain(&self, features: &FeatureVector) -> Result<Vec<ExplanationEntry>> {
        let contributions = self.attributor.contributions(features)?;
        if contributions.len() != features.len() {
            return Err(ScoringError::inference(format!(
                "attribution returned {} values for {} features",
                contributions.len(),
                features.len()
            )));
        }

        let mut ranked: Vec<(&str, f64)> = features
            .names()
            .iter()
            .map(String::as_str)
            .zip(contributions)
            .filter(|(name, value)| {
                let finite = value.is_finite();
                if !finite {
                    warn!(feature = %name, "Non-finite contribution skipped");
                }
                finite
            })
            .collect();

        // stable: ties stay in schema order
        ranked.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()));

        let entries: Vec<ExplanationEntry> = ranked
            .into_iter()
            .take(self.top_k)
            .map(|(name, contribution)| ExplanationEntry {
                feature: name.to_string(),
                impact: round_dp(contribution, 4),
                direction: Direction::from_contribution(contribution),
            })
            .collect();

        debug!(factors = entries.len(), "Prediction explained");
        Ok(entries)
    }
}
