//! Frozen feature schema shared by training and serving
//!
//! The registry is produced once when the classifier is trained and loaded
//! read-only at serving startup. It records every population-level decision
//! (feature order, pruned columns, reference categories, fill value) so a
//! single record can be transformed exactly like the training batch.

use crate::error::{Result, ScoringError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

fn default_model_version() -> String {
    "v1.0".to_string()
}

/// Serialized metadata record written next to the trained classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaMetadata {
    /// Ordered feature names the classifier was trained on
    pub features: Vec<String>,
    /// negatives / positives in the training labels (informational)
    #[serde(default)]
    pub imbalance_ratio: Option<f64>,
    #[serde(default = "default_model_version")]
    pub model_version: String,
    /// Value emitted for schema features the record did not produce; always 0.0
    #[serde(default)]
    pub fill_value: f64,
    /// Attributes pruned for excessive missing values at training time
    #[serde(default)]
    pub dropped_columns: Vec<String>,
    /// Categorical attribute -> category that has no indicator column
    #[serde(default)]
    pub reference_categories: BTreeMap<String, String>,
    /// Categorical attribute -> raw values observed in training, sorted
    #[serde(default)]
    pub categories: BTreeMap<String, Vec<String>>,
}

impl SchemaMetadata {
    pub fn new(features: Vec<String>) -> Self {
        Self {
            features,
            imbalance_ratio: None,
            model_version: default_model_version(),
            fill_value: 0.0,
            dropped_columns: Vec::new(),
            reference_categories: BTreeMap::new(),
            categories: BTreeMap::new(),
        }
    }
}

/// Immutable ordered set of trained feature names
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    names: Arc<[String]>,
    index: HashMap<String, usize>,
    dropped: HashSet<String>,
    metadata: SchemaMetadata,
}

impl SchemaRegistry {
    /// Build a registry, rejecting empty or duplicated feature lists and any
    /// fill value other than the 0.0 the classifier was trained with
    pub fn new(metadata: SchemaMetadata) -> Result<Self> {
        if metadata.features.is_empty() {
            return Err(ScoringError::validation("schema has no features"));
        }
        if metadata.fill_value != 0.0 {
            return Err(ScoringError::validation(format!(
                "schema fill_value must be 0.0, got {}",
                metadata.fill_value
            )));
        }

        let mut index = HashMap::with_capacity(metadata.features.len());
        for (position, name) in metadata.features.iter().enumerate() {
            if index.insert(name.clone(), position).is_some() {
                return Err(ScoringError::validation(format!(
                    "feature '{name}' appears more than once in the schema"
                )));
            }
        }

        Ok(Self {
            names: metadata.features.clone().into(),
            index,
            dropped: metadata.dropped_columns.iter().cloned().collect(),
            metadata,
        })
    }

    /// Load the metadata JSON produced at training time
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ScoringError::artifact(path, e))?;
        let metadata: SchemaMetadata =
            serde_json::from_str(&raw).map_err(|e| ScoringError::artifact(path, e))?;
        let registry = Self::new(metadata).map_err(|e| ScoringError::artifact(path, e))?;

        info!(
            path = %path.display(),
            features = registry.len(),
            dropped_columns = registry.metadata.dropped_columns.len(),
            model_version = %registry.metadata.model_version,
            "Schema registry loaded"
        );

        Ok(registry)
    }

    /// Write the metadata JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(&self.metadata)
            .map_err(|e| ScoringError::artifact(path, e))?;
        std::fs::write(path, json).map_err(|e| ScoringError::artifact(path, e))
    }

    pub fn names(&self) -> &Arc<[String]> {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn fill_value(&self) -> f64 {
        self.metadata.fill_value
    }

    /// Whether an attribute was pruned as too sparse at training time
    pub fn is_dropped(&self, attribute: &str) -> bool {
        self.dropped.contains(attribute)
    }

    pub fn dropped_columns(&self) -> &[String] {
        &self.metadata.dropped_columns
    }

    pub fn reference_category(&self, attribute: &str) -> Option<&str> {
        self.metadata
            .reference_categories
            .get(attribute)
            .map(String::as_str)
    }

    pub fn imbalance_ratio(&self) -> Option<f64> {
        self.metadata.imbalance_ratio
    }

    pub fn model_version(&self) -> &str {
        &self.metadata.model_version
    }

    pub fn metadata(&self) -> &SchemaMetadata {
        &self.metadata
    }
}
