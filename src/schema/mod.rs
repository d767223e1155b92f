//! Trained feature schema: registry, alignment and training-time freezing

pub mod aligner;
pub mod builder;
pub mod registry;

pub use aligner::{FeatureVector, SchemaAligner};
pub use builder::{LabeledApplication, SchemaBuilder};
pub use registry::{SchemaMetadata, SchemaRegistry};
