//! ONNX model loader

use crate::error::{Result, ScoringError};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::ValueType;
use std::path::Path;
use tracing::info;

/// Loaded ONNX model with metadata
pub struct LoadedModel {
    /// Model name
    pub name: String,
    /// ONNX Runtime session
    pub session: Session,
    /// Input name for the model
    pub input_name: String,
    /// Output name for probabilities or contributions
    pub output_name: String,
    /// Declared feature width of the input, if static
    pub input_width: Option<usize>,
}

/// Loader for ONNX models
pub struct ModelLoader {
    /// Number of threads for ONNX inference
    onnx_threads: usize,
}

impl ModelLoader {
    /// Create a new model loader with default settings (1 thread)
    pub fn new() -> Result<Self> {
        Self::with_threads(1)
    }

    /// Create a new model loader with specified number of threads
    pub fn with_threads(onnx_threads: usize) -> Result<Self> {
        ort::init()
            .commit()
            .map_err(|e| ScoringError::artifact("onnxruntime", e))?;
        info!(onnx_threads = onnx_threads, "ONNX Runtime initialized");
        Ok(Self { onnx_threads })
    }

    /// Load a single ONNX model from file.
    ///
    /// `output_hint` selects the output whose name contains it; otherwise
    /// the last output is used.
    pub fn load_model<P: AsRef<Path>>(
        &self,
        path: P,
        name: &str,
        output_hint: &str,
    ) -> Result<LoadedModel> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ScoringError::artifact(path, "file not found"));
        }

        info!(
            model = %name,
            path = %path.display(),
            threads = self.onnx_threads,
            "Loading ONNX model"
        );

        let session = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.with_intra_threads(self.onnx_threads))
            .and_then(|b| b.commit_from_file(path))
            .map_err(|e| ScoringError::artifact(path, e))?;

        let input = session
            .inputs
            .first()
            .ok_or_else(|| ScoringError::artifact(path, "model declares no inputs"))?;
        let input_name = input.name.clone();
        let input_width = match &input.input_type {
            ValueType::Tensor { shape, .. } => shape
                .last()
                .copied()
                .filter(|&d| d > 0)
                .map(|d| d as usize),
            _ => None,
        };

        let output_name = session
            .outputs
            .iter()
            .find(|o| o.name.contains(output_hint))
            .or_else(|| session.outputs.last())
            .map(|o| o.name.clone())
            .ok_or_else(|| ScoringError::artifact(path, "model declares no outputs"))?;

        info!(
            model = %name,
            input = %input_name,
            output = %output_name,
            input_width = ?input_width,
            "Model loaded successfully"
        );

        Ok(LoadedModel {
            name: name.to_string(),
            session,
            input_name,
            output_name,
            input_width,
        })
    }

    /// Load a model and check its input width against the schema
    pub fn load_for_schema<P: AsRef<Path>>(
        &self,
        path: P,
        name: &str,
        output_hint: &str,
        expected_width: usize,
    ) -> Result<LoadedModel> {
        let path = path.as_ref();
        let model = self.load_model(path, name, output_hint)?;

        if let Some(width) = model.input_width {
            if width != expected_width {
                return Err(ScoringError::artifact(
                    path,
                    format!("model expects {width} features, schema has {expected_width}"),
                ));
            }
        }

        Ok(model)
    }
}
