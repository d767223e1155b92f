//! Credit Risk Scoring Library
//!
//! Scores a loan applicant's probability of default against a trained
//! gradient-boosted classifier, maps it to a credit score, risk tier and
//! decision, and explains the decision with the top contributing features.

pub mod batch;
pub mod cleaning;
pub mod config;
pub mod error;
pub mod feature_extractor;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod policy;
pub mod schema;
pub mod types;

pub use batch::BatchScorer;
pub use config::AppConfig;
pub use error::{Result, ScoringError};
pub use feature_extractor::FeatureExtractor;
pub use pipeline::{InferencePipeline, PipelineStage, StageFailure};
pub use schema::{SchemaBuilder, SchemaRegistry};
pub use types::{LoanApplication, ScoreResponse, ScoreResult, ScoredApplication};
