//! Configuration management for the credit risk scorer

use crate::cleaning::DEFAULT_MISSING_THRESHOLD;
use crate::models::explainer::DEFAULT_TOP_K;
use crate::policy::DecisionThresholds;
use anyhow::{ensure, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// How per-prediction contributions are computed
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExplanationMethod {
    /// Exported contribution model (requires `artifacts.contributions_file`)
    Contributions,
    /// Log-odds change when each feature is replaced by the fill value
    #[default]
    Occlusion,
}

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub artifacts: ArtifactsConfig,
    #[serde(default)]
    pub decision: DecisionThresholds,
    #[serde(default)]
    pub explanation: ExplanationConfig,
    #[serde(default)]
    pub cleaning: CleaningConfig,
    pub pipeline: PipelineConfig,
    pub batch: BatchConfig,
    pub logging: LoggingConfig,
}

/// Trained artifact locations
#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactsConfig {
    /// Directory containing the classifier and metadata files
    pub models_dir: String,
    /// ONNX classifier file name
    pub classifier_file: String,
    /// Schema metadata JSON file name
    pub metadata_file: String,
    /// ONNX contribution model file name
    #[serde(default)]
    pub contributions_file: Option<String>,
    /// Number of threads for ONNX inference per model (default: 1)
    #[serde(default = "default_onnx_threads")]
    pub onnx_threads: usize,
}

fn default_onnx_threads() -> usize {
    1
}

impl ArtifactsConfig {
    pub fn classifier_path(&self) -> PathBuf {
        Path::new(&self.models_dir).join(&self.classifier_file)
    }

    pub fn metadata_path(&self) -> PathBuf {
        Path::new(&self.models_dir).join(&self.metadata_file)
    }

    pub fn contributions_path(&self) -> Option<PathBuf> {
        self.contributions_file
            .as_ref()
            .map(|file| Path::new(&self.models_dir).join(file))
    }
}

/// Explanation configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ExplanationConfig {
    #[serde(default)]
    pub method: ExplanationMethod,
    /// Number of factors reported per decision (1-5)
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

impl Default for ExplanationConfig {
    fn default() -> Self {
        Self {
            method: ExplanationMethod::default(),
            top_k: DEFAULT_TOP_K,
        }
    }
}

/// Training-time cleaning configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CleaningConfig {
    /// Attributes missing in more than this percentage of rows are pruned
    pub missing_threshold_percent: f64,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            missing_threshold_percent: DEFAULT_MISSING_THRESHOLD,
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Number of concurrent scoring workers
    pub workers: usize,
    /// Timeout for one whole pipeline call in milliseconds
    pub timeout_ms: u64,
}

/// Batch scoring input and output
#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
    /// JSON-lines file of applications
    pub input_path: String,
    /// JSON-lines file of responses
    pub output_path: String,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/config.toml")
    }

    /// Load configuration from a specific path, with `CREDIT__SECTION__KEY`
    /// environment overrides
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(Environment::with_prefix("CREDIT").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let config: Self = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.decision.is_valid(),
            "decision thresholds must satisfy 0 <= review ({}) <= reject ({}) <= 1",
            self.decision.review_threshold,
            self.decision.reject_threshold
        );
        ensure!(self.pipeline.workers > 0, "pipeline.workers must be positive");
        ensure!(
            (1..=DEFAULT_TOP_K).contains(&self.explanation.top_k),
            "explanation.top_k must be within 1-{DEFAULT_TOP_K}, got {}",
            self.explanation.top_k
        );
        ensure!(
            (0.0..=100.0).contains(&self.cleaning.missing_threshold_percent),
            "cleaning.missing_threshold_percent must be within 0-100"
        );
        ensure!(
            self.explanation.method != ExplanationMethod::Contributions
                || self.artifacts.contributions_file.is_some(),
            "explanation.method = \"contributions\" requires artifacts.contributions_file"
        );
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            artifacts: ArtifactsConfig {
                models_dir: "data/models".to_string(),
                classifier_file: "xgb_credit_risk_v1.onnx".to_string(),
                metadata_file: "model_metadata.json".to_string(),
                contributions_file: None,
                onnx_threads: 1,
            },
            decision: DecisionThresholds::default(),
            explanation: ExplanationConfig::default(),
            cleaning: CleaningConfig::default(),
            pipeline: PipelineConfig {
                workers: 4,
                timeout_ms: 1000,
            },
            batch: BatchConfig {
                input_path: "data/applications.jsonl".to_string(),
                output_path: "data/decisions.jsonl".to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.decision.review_threshold, 0.20);
        assert_eq!(config.decision.reject_threshold, 0.50);
        assert_eq!(config.explanation.top_k, 5);
        assert_eq!(config.explanation.method, ExplanationMethod::Occlusion);
        assert_eq!(
            config.artifacts.metadata_path(),
            PathBuf::from("data/models/model_metadata.json")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            [artifacts]
            models_dir = "models"
            classifier_file = "clf.onnx"
            metadata_file = "meta.json"
            contributions_file = "contribs.onnx"

            [decision]
            review_threshold = 0.25
            reject_threshold = 0.6

            [explanation]
            method = "contributions"

            [pipeline]
            workers = 2
            timeout_ms = 500

            [batch]
            input_path = "in.jsonl"
            output_path = "out.jsonl"

            [logging]
            level = "debug"
            format = "json"
            "#,
        )
        .unwrap();

        let config = AppConfig::load_from_path(&path).unwrap();
        assert_eq!(config.decision.review_threshold, 0.25);
        assert_eq!(config.explanation.method, ExplanationMethod::Contributions);
        assert_eq!(config.explanation.top_k, 5);
        assert_eq!(config.artifacts.onnx_threads, 1);
        assert_eq!(
            config.artifacts.contributions_path(),
            Some(PathBuf::from("models/contribs.onnx"))
        );
        assert_eq!(config.cleaning.missing_threshold_percent, 50.0);
    }

    #[test]
    fn test_validate_rejects_inverted_thresholds() {
        let mut config = AppConfig::default();
        config.decision.review_threshold = 0.7;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bounds_top_k() {
        let mut config = AppConfig::default();
        config.explanation.top_k = 10;
        assert!(config.validate().is_err());

        config.explanation.top_k = 0;
        assert!(config.validate().is_err());

        config.explanation.top_k = 3;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_contributions_file() {
        let mut config = AppConfig::default();
        config.explanation.method = ExplanationMethod::Contributions;
        assert!(config.validate().is_err());
    }
}
