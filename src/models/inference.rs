//! Classifier capability and the scoring engine wrapping it

use crate::error::{Result, ScoringError};
use crate::models::loader::LoadedModel;
use crate::schema::FeatureVector;
use ort::memory::Allocator;
use ort::value::{DowncastableTarget, DynMapValueType, DynSequenceValueType, Tensor};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Binary classifier returning the probability of the positive (default) class
pub trait Classifier: Send + Sync {
    fn name(&self) -> &str;

    fn predict_proba(&self, features: &FeatureVector) -> Result<f64>;
}

/// Gradient-boosted classifier exported to ONNX
pub struct OnnxClassifier {
    name: String,
    model: Mutex<LoadedModel>,
}

impl OnnxClassifier {
    pub fn new(model: LoadedModel) -> Self {
        Self {
            name: model.name.clone(),
            model: Mutex::new(model),
        }
    }

    /// Extract default probability from model output.
    /// Handles tensor outputs and seq(map(int64, float)) outputs.
    fn extract_probability(
        outputs: &ort::session::SessionOutputs,
        output_name: &str,
        model_name: &str,
    ) -> Result<f64> {
        if let Some(output) = outputs.get(output_name) {
            if let Some(prob) = Self::extract_from_value(output, model_name) {
                return Ok(prob);
            }
        }

        // Fallback: any non-label output that yields a probability
        for (name, output) in outputs.iter() {
            if name.contains("label") {
                continue;
            }
            if let Some(prob) = Self::extract_from_value(&output, model_name) {
                debug!(
                    model = %model_name,
                    output = %name,
                    prob = prob,
                    "Extracted from fallback output"
                );
                return Ok(prob);
            }
        }

        Err(ScoringError::inference(format!(
            "model '{model_name}' produced no probability output"
        )))
    }

    fn extract_from_value(output: &ort::value::DynValue, model_name: &str) -> Option<f64> {
        if let Ok((shape, data)) = output.try_extract_tensor::<f32>() {
            let dims: Vec<i64> = shape.iter().copied().collect();
            return Self::default_prob_from_tensor(&dims, data);
        }

        if DynSequenceValueType::can_downcast(&output.dtype()) {
            return Self::extract_from_sequence_map(output, model_name).ok();
        }

        None
    }

    /// Positive-class probability from [batch, classes], [classes] or [batch, 1]
    fn default_prob_from_tensor(dims: &[i64], data: &[f32]) -> Option<f64> {
        let classes = dims.last().copied().unwrap_or(data.len() as i64);
        let value = if classes >= 2 { data.get(1) } else { data.first() };
        value.map(|&v| v as f64)
    }

    /// Extract probability from seq(map(int64, float)) format
    fn extract_from_sequence_map(output: &ort::value::DynValue, model_name: &str) -> Result<f64> {
        let allocator = Allocator::default();

        let sequence = output
            .downcast_ref::<DynSequenceValueType>()
            .map_err(|e| ScoringError::inference(e))?;
        let maps = sequence.try_extract_sequence::<DynMapValueType>(&allocator)?;

        let map_value = maps
            .first()
            .ok_or_else(|| ScoringError::inference("empty probability sequence"))?;
        let kv_pairs = map_value.try_extract_key_values::<i64, f32>()?;

        if let Some((_, prob)) = kv_pairs.iter().find(|(class_id, _)| *class_id == 1) {
            debug!(model = %model_name, prob = *prob, "Extracted from seq(map)");
            return Ok(*prob as f64);
        }
        if let Some((_, prob)) = kv_pairs.iter().find(|(class_id, _)| *class_id == 0) {
            return Ok(1.0 - *prob as f64);
        }

        Err(ScoringError::inference("no class probability found in map"))
    }
}

impl Classifier for OnnxClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn predict_proba(&self, features: &FeatureVector) -> Result<f64> {
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

        Self::extract_probability(&outputs, &model.output_name, &model.name)
    }
}

/// Scoring engine wrapping the classifier loaded at startup
#[derive(Clone)]
pub struct ScoringEngine {
    classifier: std::result::Result<Arc<dyn Classifier>, String>,
}

impl ScoringEngine {
    pub fn new(classifier: Arc<dyn Classifier>) -> Self {
        Self {
            classifier: Ok(classifier),
        }
    }

    /// Engine whose classifier failed to load; every call fails
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            classifier: Err(reason.into()),
        }
    }

    pub fn is_available(&self) -> bool {
        self.classifier.is_ok()
    }

    pub fn classifier(&self) -> Result<&Arc<dyn Classifier>> {
        self.classifier
            .as_ref()
            .map_err(|reason| ScoringError::ModelUnavailable(reason.clone()))
    }

    /// Probability of default for an aligned vector.
    ///
    /// Non-finite output is passed through; the caller decides whether it
    /// can be served.
    pub fn score(&self, features: &FeatureVector) -> Result<f64> {
        let classifier = self.classifier()?;
        let probability = classifier.predict_proba(features)?;

        if probability.is_finite() && !(0.0..=1.0).contains(&probability) {
            warn!(
                model = %classifier.name(),
                probability = probability,
                "Probability out of range"
            );
            return Err(ScoringError::inference(format!(
                "model '{}' returned probability {probability} outside [0, 1]",
                classifier.name()
            )));
        }

        debug!(model = %classifier.name(), probability = probability, "Application scored");
        Ok(probability)
    }
}
