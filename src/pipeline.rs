//! End-to-end scoring of a single application.
//!
//! `Idle -> Cleaning -> Deriving -> Aligning -> Scoring -> Deciding ->
//! Explaining -> Done`, with any stage failure going straight to `Failed`.
//! The pipeline holds only read-only state loaded at startup, so one
//! instance can be shared across any number of concurrent callers.

use crate::cleaning::CleaningStage;
use crate::config::{AppConfig, ExplanationMethod};
use crate::error::ScoringError;
use crate::feature_extractor::FeatureExtractor;
use crate::models::{
    Attributor, Classifier, ExplanationEngine, ModelLoader, OcclusionAttributor, OnnxAttributor,
    OnnxClassifier, ScoringEngine,
};
use crate::policy::DecisionPolicy;
use crate::schema::{SchemaAligner, SchemaRegistry};
use crate::types::application::{ApplicantRecord, LoanApplication};
use crate::types::result::{ScoreResponse, ScoreResult};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Position of a request in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    Idle,
    Cleaning,
    Deriving,
    Aligning,
    Scoring,
    Deciding,
    Explaining,
    Done,
    Failed,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Idle => "idle",
            PipelineStage::Cleaning => "cleaning",
            PipelineStage::Deriving => "deriving",
            PipelineStage::Aligning => "aligning",
            PipelineStage::Scoring => "scoring",
            PipelineStage::Deciding => "deciding",
            PipelineStage::Explaining => "explaining",
            PipelineStage::Done => "done",
            PipelineStage::Failed => "failed",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request that entered `Failed`, with the stage it failed in
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{error}")]
pub struct StageFailure {
    pub stage: PipelineStage,
    #[source]
    pub error: ScoringError,
}

/// Tracks one request through the stage sequence
struct Run {
    sk_id_curr: i64,
    stage: PipelineStage,
}

impl Run {
    fn start(sk_id_curr: i64) -> Self {
        Self {
            sk_id_curr,
            stage: PipelineStage::Idle,
        }
    }

    fn enter(&mut self, stage: PipelineStage) {
        debug!(sk_id_curr = self.sk_id_curr, from = %self.stage, to = %stage, "Stage transition");
        self.stage = stage;
    }

    fn fail(&self, error: ScoringError) -> StageFailure {
        warn!(
            sk_id_curr = self.sk_id_curr,
            stage = %self.stage,
            error = %error,
            "Scoring failed"
        );
        StageFailure {
            stage: self.stage,
            error,
        }
    }
}

/// Composition of cleaning, derivation, alignment, scoring, decision and
/// explanation over one frozen schema and one classifier
#[derive(Clone)]
pub struct InferencePipeline {
    schema: Arc<SchemaRegistry>,
    cleaning: CleaningStage,
    extractor: FeatureExtractor,
    aligner: SchemaAligner,
    engine: ScoringEngine,
    policy: DecisionPolicy,
    explainer: ExplanationEngine,
}

impl InferencePipeline {
    pub fn new(
        schema: Arc<SchemaRegistry>,
        engine: ScoringEngine,
        explainer: ExplanationEngine,
        policy: DecisionPolicy,
    ) -> Self {
        Self {
            cleaning: CleaningStage::from_schema(&schema),
            extractor: FeatureExtractor::from_schema(&schema),
            aligner: SchemaAligner::new(),
            schema,
            engine,
            policy,
            explainer,
        }
    }

    /// Load every artifact named in the configuration.
    ///
    /// Any failure here is fatal: the process must not start serving.
    pub fn from_config(config: &AppConfig) -> crate::error::Result<Self> {
        let artifacts = &config.artifacts;
        let classifier_path = artifacts.classifier_path();
        let contributions_path = match config.explanation.method {
            ExplanationMethod::Contributions => Some(artifacts.contributions_path().ok_or_else(
                || {
                    ScoringError::artifact(
                        artifacts.models_dir.as_str(),
                        "contributions explanation configured without a contributions_file",
                    )
                },
            )?),
            ExplanationMethod::Occlusion => None,
        };

        let schema = Arc::new(SchemaRegistry::load(artifacts.metadata_path())?);

        // every model file must exist before the runtime is initialised
        for path in std::iter::once(&classifier_path).chain(contributions_path.as_ref()) {
            if !path.exists() {
                return Err(ScoringError::artifact(path, "file not found"));
            }
        }

        let loader = ModelLoader::with_threads(artifacts.onnx_threads)?;
        let classifier: Arc<dyn Classifier> = Arc::new(OnnxClassifier::new(
            loader.load_for_schema(&classifier_path, "classifier", "prob", schema.len())?,
        ));

        let attributor: Arc<dyn Attributor> = match contributions_path {
            Some(path) => Arc::new(OnnxAttributor::new(loader.load_for_schema(
                path,
                "contributions",
                "contrib",
                schema.len(),
            )?)),
            None => Arc::new(OcclusionAttributor::new(
                Arc::clone(&classifier),
                schema.fill_value(),
            )),
        };

        info!(
            features = schema.len(),
            model_version = %schema.model_version(),
            imbalance_ratio = ?schema.imbalance_ratio(),
            explanation = ?config.explanation.method,
            "Inference pipeline ready"
        );

        Ok(Self::new(
            schema,
            ScoringEngine::new(classifier),
            ExplanationEngine::new(attributor).with_top_k(config.explanation.top_k),
            DecisionPolicy::new(config.decision),
        ))
    }

    pub fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    /// Score a validated application
    pub fn score(&self, application: LoanApplication) -> Result<ScoreResult, StageFailure> {
        let mut run = Run::start(application.sk_id_curr);

        run.enter(PipelineStage::Cleaning);
        let cleaned = self
            .cleaning
            .clean(ApplicantRecord::from(application))
            .map_err(|e| run.fail(e))?;

        run.enter(PipelineStage::Deriving);
        let derived = self.extractor.derive(&cleaned).map_err(|e| run.fail(e))?;

        run.enter(PipelineStage::Aligning);
        let features = self.aligner.align(&derived, &self.schema);

        run.enter(PipelineStage::Scoring);
        let probability = self.engine.score(&features).map_err(|e| run.fail(e))?;
        if !probability.is_finite() {
            return Err(run.fail(ScoringError::Computation(format!(
                "classifier returned non-finite probability {probability}; non-finite inputs: {:?}",
                features.non_finite()
            ))));
        }

        run.enter(PipelineStage::Deciding);
        let outcome = self.policy.decide(probability);

        run.enter(PipelineStage::Explaining);
        let top_factors = self.explainer.explain(&features).map_err(|e| run.fail(e))?;

        run.enter(PipelineStage::Done);
        Ok(ScoreResult {
            probability_default: probability,
            credit_score: outcome.credit_score,
            risk_tier: outcome.risk_tier,
            decision: outcome.decision,
            top_factors,
        })
    }

    /// Validate an untyped application at the boundary, then score it
    pub fn score_value(&self, value: serde_json::Value) -> Result<ScoreResult, StageFailure> {
        let application = LoanApplication::from_value(value).map_err(|error| {
            warn!(error = %error, "Application rejected at boundary");
            StageFailure {
                stage: PipelineStage::Idle,
                error,
            }
        })?;
        self.score(application)
    }

    /// Score and render the wire response
    pub fn respond(&self, value: serde_json::Value) -> ScoreResponse {
        match self.score_value(value) {
            Ok(result) => ScoreResponse::Scored(result),
            Err(failure) => ScoreResponse::Failed {
                error: failure.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::explainer::tests::FixedAttributor;
    use crate::models::inference::tests::{FixedClassifier, LinearClassifier};
    use crate::schema::{LabeledApplication, SchemaBuilder, SchemaMetadata};
    use crate::types::application::sample_application;
    use crate::types::result::{Decision, Direction, RiskTier};
    use serde_json::json;

    fn trained_schema() -> Arc<SchemaRegistry> {
        let rows: Vec<LabeledApplication> = [
            ("M", Some("Married"), Some("Higher education"), 0),
            ("F", Some("Single / not married"), Some("Secondary / secondary special"), 1),
            ("F", Some("Civil marriage"), None, 0),
            ("M", None, Some("Higher education"), 0),
        ]
        .into_iter()
        .map(|(gender, family, education, target)| {
            let mut application = sample_application();
            application.code_gender = gender.to_string();
            application.name_family_status = family.map(str::to_string);
            application.name_education_type = education.map(str::to_string);
            application.days_id_publish = Some(-1500);
            LabeledApplication {
                application,
                target,
            }
        })
        .collect();

        Arc::new(SchemaBuilder::new().fit(&rows).unwrap())
    }

    fn pipeline_with(
        schema: Arc<SchemaRegistry>,
        classifier: Arc<dyn Classifier>,
    ) -> InferencePipeline {
        let attributor = Arc::new(OcclusionAttributor::new(
            Arc::clone(&classifier),
            schema.fill_value(),
        ));
        InferencePipeline::new(
            schema,
            ScoringEngine::new(classifier),
            ExplanationEngine::new(attributor),
            DecisionPolicy::default(),
        )
    }

    /// Logistic model rewarding bureau scores and penalizing credit term
    fn risk_model(schema: &SchemaRegistry) -> Arc<dyn Classifier> {
        let weights = schema
            .names()
            .iter()
            .map(|name| match name.as_str() {
                "EXT_SOURCE_2" => -3.0,
                "EXT_SOURCE_3" => -2.0,
                "CREDIT_TERM" => 0.04,
                "CODE_GENDER_M" => 0.2,
                "DAYS_EMPLOYED_ANOM" => 0.4,
                _ => 0.0,
            })
            .collect();
        Arc::new(LinearClassifier {
            weights,
            bias: 0.5,
        })
    }

    fn sample_json() -> serde_json::Value {
        json!({
            "SK_ID_CURR": 100002, "NAME_CONTRACT_TYPE": "Cash loans", "CODE_GENDER": "M",
            "AMT_INCOME_TOTAL": 200000, "AMT_CREDIT": 1000000, "AMT_ANNUITY": 50000,
            "AMT_GOODS_PRICE": 900000, "DAYS_EMPLOYED": -500, "DAYS_BIRTH": -10000,
            "DAYS_ID_PUBLISH": -1500, "EXT_SOURCE_2": 0.5, "EXT_SOURCE_3": 0.5
        })
    }

    /// Sample application with every attribute the trained schema keeps
    fn complete_application() -> LoanApplication {
        LoanApplication {
            days_id_publish: Some(-1500),
            ..sample_application()
        }
    }

    #[test]
    fn test_vector_shape_matches_schema() {
        let schema = trained_schema();
        let pipeline = pipeline_with(Arc::clone(&schema), risk_model(&schema));

        let variants = [
            sample_application(),
            LoanApplication {
                name_family_status: Some("Widow".to_string()),
                name_education_type: Some("Higher education".to_string()),
                days_id_publish: Some(-200),
                ext_source_1: Some(0.4),
                days_employed: 365_243,
                ..sample_application()
            },
            LoanApplication {
                code_gender: "F".to_string(),
                name_contract_type: "Revolving loans".to_string(),
                ..sample_application()
            },
        ];

        for application in variants {
            let cleaned = pipeline
                .cleaning
                .clean(ApplicantRecord::from(application))
                .unwrap();
            let derived = pipeline.extractor.derive(&cleaned).unwrap();
            let features = pipeline.aligner.align(&derived, &schema);

            assert_eq!(features.names(), schema.names().as_ref());
            assert_eq!(features.len(), schema.len());
        }
    }

    #[test]
    fn test_end_to_end_result() {
        let schema = trained_schema();
        let pipeline = pipeline_with(Arc::clone(&schema), risk_model(&schema));

        let result = pipeline.score_value(sample_json()).unwrap();

        // margin = 0.5 - 1.5 - 1.0 + 0.04 * 20 + 0.2 = -1.0
        let expected = 1.0 / (1.0 + 1.0f64.exp());
        assert!((result.probability_default - expected).abs() < 1e-12);
        assert_eq!(result.risk_tier, RiskTier::Medium);
        assert_eq!(result.decision, Decision::ManualReview);
        assert_eq!(result.credit_score, 731);

        let names: Vec<&str> = result.top_factors.iter().map(|f| f.feature.as_str()).collect();
        assert_eq!(names.len(), 5);
        assert_eq!(&names[..4], ["EXT_SOURCE_2", "EXT_SOURCE_3", "CREDIT_TERM", "CODE_GENDER_M"]);
        assert_eq!(result.top_factors[4].impact, 0.0);
        assert_eq!(result.top_factors[0].direction, Direction::ReducesRisk);
        assert_eq!(result.top_factors[2].direction, Direction::IncreasesRisk);
    }

    #[test]
    fn test_invalid_gender_fails_in_cleaning() {
        let schema = trained_schema();
        let pipeline = pipeline_with(Arc::clone(&schema), risk_model(&schema));
        let mut value = sample_json();
        value["CODE_GENDER"] = json!("XNA");

        let failure = pipeline.score_value(value).unwrap_err();

        assert_eq!(failure.stage, PipelineStage::Cleaning);
        assert!(matches!(failure.error, ScoringError::Validation(_)));
    }

    #[test]
    fn test_missing_attribute_fails_at_boundary() {
        let schema = trained_schema();
        let pipeline = pipeline_with(Arc::clone(&schema), risk_model(&schema));
        let mut value = sample_json();
        value.as_object_mut().unwrap().remove("EXT_SOURCE_3");

        let response = pipeline.respond(value);

        match response {
            ScoreResponse::Failed { error } => assert!(error.contains("EXT_SOURCE_3")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_unavailable_model_fails_in_scoring() {
        let schema = trained_schema();
        let pipeline = InferencePipeline::new(
            Arc::clone(&schema),
            ScoringEngine::unavailable("classifier failed to load"),
            ExplanationEngine::new(Arc::new(FixedAttributor(vec![0.0; schema.len()]))),
            DecisionPolicy::default(),
        );

        let failure = pipeline.score(sample_application()).unwrap_err();

        assert_eq!(failure.stage, PipelineStage::Scoring);
        assert!(matches!(failure.error, ScoringError::ModelUnavailable(_)));
    }

    #[test]
    fn test_non_finite_probability_is_a_failure() {
        let schema = Arc::new(
            SchemaRegistry::new(SchemaMetadata::new(vec!["CREDIT_TERM".to_string()])).unwrap(),
        );
        let pipeline = pipeline_with(schema, identity_model());

        let application = LoanApplication {
            amt_credit: 0.0,
            amt_annuity: 0.0,
            ..sample_application()
        };
        let failure = pipeline.score(application).unwrap_err();

        assert_eq!(failure.stage, PipelineStage::Scoring);
        assert!(matches!(
            failure.error,
            ScoringError::Computation(ref m) if m.contains("CREDIT_TERM")
        ));
    }

    fn identity_model() -> Arc<dyn Classifier> {
        Arc::new(LinearClassifier {
            weights: vec![1.0],
            bias: 0.0,
        })
    }

    #[test]
    fn test_reference_probability_example() {
        let schema = trained_schema();
        let attributor = Arc::new(FixedAttributor(vec![0.0; schema.len()]));
        let pipeline = InferencePipeline::new(
            Arc::clone(&schema),
            ScoringEngine::new(Arc::new(FixedClassifier(0.0734))),
            ExplanationEngine::new(attributor),
            DecisionPolicy::default(),
        );

        let result = pipeline.score(sample_application()).unwrap();
        let wire = serde_json::to_value(ScoreResponse::Scored(result)).unwrap();

        assert_eq!(wire["probability_default"], 0.0734);
        assert_eq!(wire["credit_score"], 927);
        assert_eq!(wire["risk_tier"], "Low Risk");
        assert_eq!(wire["decision"], "APPROVE");
        assert!(wire["top_factors"].as_array().unwrap().len() <= 5);
    }

    #[test]
    fn test_concurrent_scoring_shares_pipeline() {
        let schema = trained_schema();
        let pipeline = Arc::new(pipeline_with(Arc::clone(&schema), risk_model(&schema)));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let pipeline = Arc::clone(&pipeline);
                std::thread::spawn(move || {
                    let application = LoanApplication {
                        sk_id_curr: 100_000 + i,
                        ext_source_2: 0.1 * i as f64,
                        ..complete_application()
                    };
                    pipeline.score(application).unwrap().credit_score
                })
            })
            .collect();

        let scores: Vec<u32> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(scores.windows(2).all(|w| w[0] <= w[1]));
    }

    fn config_in(dir: &std::path::Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.artifacts.models_dir = dir.display().to_string();
        config
    }

    fn startup_error(config: &AppConfig) -> ScoringError {
        match InferencePipeline::from_config(config) {
            Ok(_) => panic!("pipeline started without its artifacts"),
            Err(e) => e,
        }
    }

    #[test]
    fn test_startup_fails_without_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());

        match startup_error(&config) {
            ScoringError::ArtifactLoad { path, .. } => {
                assert_eq!(path, config.artifacts.metadata_path())
            }
            other => panic!("expected artifact error, got {other:?}"),
        }
    }

    #[test]
    fn test_startup_fails_without_classifier() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        SchemaRegistry::new(SchemaMetadata::new(vec!["CREDIT_TERM".to_string()]))
            .unwrap()
            .save(config.artifacts.metadata_path())
            .unwrap();

        match startup_error(&config) {
            ScoringError::ArtifactLoad { path, reason } => {
                assert_eq!(path, config.artifacts.classifier_path());
                assert_eq!(reason, "file not found");
            }
            other => panic!("expected artifact error, got {other:?}"),
        }
    }

    #[test]
    fn test_startup_fails_without_contributions_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.explanation.method = ExplanationMethod::Contributions;
        SchemaRegistry::new(SchemaMetadata::new(vec!["CREDIT_TERM".to_string()]))
            .unwrap()
            .save(config.artifacts.metadata_path())
            .unwrap();

        assert!(matches!(
            startup_error(&config),
            ScoringError::ArtifactLoad { ref reason, .. } if reason.contains("contributions_file")
        ));
    }
}
