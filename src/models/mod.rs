//! Classifier and attribution capabilities

pub mod explainer;
pub mod inference;
pub mod loader;

pub use explainer::{Attributor, ExplanationEngine, OcclusionAttributor, OnnxAttributor};
pub use inference::{Classifier, OnnxClassifier, ScoringEngine};
pub use loader::{LoadedModel, ModelLoader};
