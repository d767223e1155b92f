//! Alignment of derived features onto the trained schema

use super::registry::SchemaRegistry;
use crate::feature_extractor::DerivedFeatures;
use std::sync::Arc;
use tracing::debug;

/// Ordered feature values with the exact shape the classifier was trained on
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    names: Arc<[String]>,
    values: Vec<f64>,
}

impl FeatureVector {
    /// Pair names and values; both must have the same length
    pub fn new(names: Arc<[String]>, values: Vec<f64>) -> Self {
        assert_eq!(names.len(), values.len(), "feature names and values differ in length");
        Self { names, values }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.values[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }

    /// Single-precision copy for the ONNX runtime
    pub fn to_f32(&self) -> Vec<f32> {
        self.values.iter().map(|&v| v as f32).collect()
    }

    /// Copy with one position replaced
    pub fn with_value(&self, index: usize, value: f64) -> Self {
        let mut values = self.values.clone();
        values[index] = value;
        Self {
            names: Arc::clone(&self.names),
            values,
        }
    }

    /// Names of positions holding NaN or infinity
    pub fn non_finite(&self) -> Vec<&str> {
        self.iter()
            .filter(|(_, v)| !v.is_finite())
            .map(|(name, _)| name)
            .collect()
    }
}

/// Reconciles derived features with the [`SchemaRegistry`].
///
/// Every schema name is emitted once in schema order; names the record did
/// not produce get the registry fill value and extras are discarded.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaAligner;

impl SchemaAligner {
    pub fn new() -> Self {
        Self
    }

    pub fn align(&self, derived: &DerivedFeatures, schema: &SchemaRegistry) -> FeatureVector {
        let fill = schema.fill_value();
        let mut filled = 0usize;

        let values: Vec<f64> = schema
            .names()
            .iter()
            .map(|name| {
                derived.get(name).unwrap_or_else(|| {
                    filled += 1;
                    fill
                })
            })
            .collect();

        let discarded = derived.iter().filter(|(name, _)| !schema.contains(name)).count();

        debug!(
            features = values.len(),
            filled = filled,
            discarded = discarded,
            "Features aligned to schema"
        );

        FeatureVector::new(Arc::clone(schema.names()), values)
    }
}
