//! Freezing population-level decisions into a schema at training time.
//!
//! Mirrors the batch preparation the classifier was trained on: anomaly
//! correction, dropping invalid rows, pruning sparse attributes, ratio
//! features, then indicator columns with the first (lexicographic) category
//! of each attribute held out as reference.

use super::registry::{SchemaMetadata, SchemaRegistry};
use crate::cleaning::{
    correct_employment_anomaly, has_invalid_gender, sparse_columns, DEFAULT_MISSING_THRESHOLD,
};
use crate::error::{Result, ScoringError};
use crate::feature_extractor::{
    indicator_name, normalize_column_name, DerivedFeatures, RATIO_FEATURES,
};
use crate::types::application::{ApplicantRecord, Attribute, LoanApplication};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

/// Training row: an application plus its default label
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabeledApplication {
    #[serde(flatten)]
    pub application: LoanApplication,
    /// 1 = defaulted
    #[serde(rename = "TARGET")]
    pub target: u8,
}

/// Builds a [`SchemaRegistry`] from a labelled training population
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    missing_threshold: f64,
    model_version: String,
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self {
            missing_threshold: DEFAULT_MISSING_THRESHOLD,
            model_version: "v1.0".to_string(),
        }
    }
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Missing-rate limit in percent (0-100)
    pub fn with_missing_threshold(mut self, percent: f64) -> Self {
        self.missing_threshold = percent;
        self
    }

    pub fn with_model_version(mut self, version: impl Into<String>) -> Self {
        self.model_version = version.into();
        self
    }

    pub fn fit(&self, rows: &[LabeledApplication]) -> Result<SchemaRegistry> {
        let mut records = Vec::with_capacity(rows.len());
        let mut targets = Vec::with_capacity(rows.len());
        for row in rows {
            let record = correct_employment_anomaly(ApplicantRecord::from(row.application.clone()));
            if has_invalid_gender(&record) {
                continue;
            }
            records.push(record);
            targets.push(row.target);
        }

        if records.is_empty() {
            return Err(ScoringError::validation("no valid rows to build a schema from"));
        }

        let dropped = sparse_columns(&records, self.missing_threshold);
        let kept = |name: &str| !dropped.iter().any(|d| d == name);

        let mut columns = ColumnCatalog::default();

        let template = records[0].attributes();
        for (name, attribute) in &template {
            if matches!(attribute, Attribute::Numeric(_)) && kept(*name) {
                columns.push(name)?;
            }
        }
        for name in RATIO_FEATURES {
            columns.push(name)?;
        }

        let mut categories = BTreeMap::new();
        let mut reference_categories = BTreeMap::new();
        for (name, attribute) in &template {
            if !matches!(attribute, Attribute::Categorical(_)) || !kept(*name) {
                continue;
            }

            let observed: BTreeSet<String> = records
                .iter()
                .flat_map(|record| {
                    record.attributes().into_iter().filter_map(|(n, a)| match a {
                        Attribute::Categorical(Some(value)) if n == *name => {
                            Some(value.to_string())
                        }
                        _ => None,
                    })
                })
                .collect();

            let mut values = observed.into_iter();
            if let Some(reference) = values.next() {
                // held out, but still reserves its normalized name
                columns.reserve(&indicator_name(name, &reference))?;
                reference_categories.insert(name.to_string(), reference.clone());
                let rest: Vec<String> = values.collect();
                for value in &rest {
                    columns.push(&indicator_name(name, value))?;
                }
                let mut all = vec![reference];
                all.extend(rest);
                categories.insert(name.to_string(), all);
            }
        }

        let positives = targets.iter().filter(|&&t| t == 1).count();
        let negatives = targets.len() - positives;
        let imbalance_ratio = (positives > 0).then(|| negatives as f64 / positives as f64);

        info!(
            rows_in = rows.len(),
            rows_dropped = rows.len() - records.len(),
            columns_dropped = dropped.len(),
            features = columns.features.len(),
            imbalance_ratio = ?imbalance_ratio,
            "Schema fitted"
        );

        SchemaRegistry::new(SchemaMetadata {
            features: columns.features,
            imbalance_ratio,
            model_version: self.model_version.clone(),
            fill_value: 0.0,
            dropped_columns: dropped,
            reference_categories,
            categories,
        })
    }
}

/// Ordered feature columns with collision tracking over every raw name seen
#[derive(Default)]
struct ColumnCatalog {
    features: Vec<String>,
    seen: DerivedFeatures,
}

impl ColumnCatalog {
    fn reserve(&mut self, raw: &str) -> Result<()> {
        self.seen.insert(raw, 0.0)
    }

    fn push(&mut self, raw: &str) -> Result<()> {
        self.reserve(raw)?;
        self.features.push(normalize_column_name(raw));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::application::sample_application;

    fn row(gender: &str, family: Option<&str>, target: u8) -> LabeledApplication {
        let mut application = sample_application();
        application.code_gender = gender.to_string();
        application.name_family_status = family.map(str::to_string);
        application.days_id_publish = Some(-1000);
        LabeledApplication {
            application,
            target,
        }
    }

    fn population() -> Vec<LabeledApplication> {
        vec![
            row("M", Some("Married"), 0),
            row("F", Some("Single / not married"), 0),
            row("F", Some("Civil marriage"), 1),
            row("XNA", Some("Widow"), 0),
            row("M", None, 0),
        ]
    }

    #[test]
    fn test_fit_feature_order() {
        let schema = SchemaBuilder::new().fit(&population()).unwrap();

        let expected = vec![
            "AMT_INCOME_TOTAL",
            "AMT_CREDIT",
            "AMT_ANNUITY",
            "AMT_GOODS_PRICE",
            "DAYS_EMPLOYED",
            "DAYS_BIRTH",
            "DAYS_ID_PUBLISH",
            "EXT_SOURCE_2",
            "EXT_SOURCE_3",
            "DAYS_EMPLOYED_ANOM",
            "CREDIT_INCOME_PERCENT",
            "ANNUITY_INCOME_PERCENT",
            "CREDIT_TERM",
            "GOODS_LOAN_RATIO",
            "ID_AGE_YEARS",
            "ID_TO_AGE_RATIO",
            "CODE_GENDER_M",
            "NAME_FAMILY_STATUS_Married",
            "NAME_FAMILY_STATUS_Singlenotmarried",
        ];
        assert_eq!(schema.names().to_vec(), expected);
    }

    #[test]
    fn test_fit_records_population_decisions() {
        let schema = SchemaBuilder::new().with_model_version("v2").fit(&population()).unwrap();

        assert_eq!(
            schema.dropped_columns(),
            &["EXT_SOURCE_1".to_string(), "NAME_EDUCATION_TYPE".to_string()]
        );
        assert_eq!(schema.reference_category("CODE_GENDER"), Some("F"));
        assert_eq!(schema.reference_category("NAME_FAMILY_STATUS"), Some("Civil marriage"));
        assert_eq!(schema.reference_category("NAME_CONTRACT_TYPE"), Some("Cash loans"));
        // 3 negatives, 1 positive after the XNA row is dropped
        assert_eq!(schema.imbalance_ratio(), Some(3.0));
        assert_eq!(schema.model_version(), "v2");
        assert!(!schema.contains("SK_ID_CURR"));
    }

    #[test]
    fn test_fit_detects_category_collision() {
        let rows = vec![
            row("M", Some("Civil marriage"), 0),
            row("F", Some("Civil-marriage"), 1),
            row("M", Some("Married"), 0),
        ];

        let err = SchemaBuilder::new().fit(&rows).unwrap_err();
        assert!(matches!(err, ScoringError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_fit_rejects_empty_population() {
        let err = SchemaBuilder::new().fit(&[row("XNA", None, 0)]).unwrap_err();
        assert!(matches!(err, ScoringError::Validation(_)));
    }

    #[test]
    fn test_labeled_row_deserialization() {
        let json = r#"{
            "SK_ID_CURR": 1, "NAME_CONTRACT_TYPE": "Cash loans", "CODE_GENDER": "F",
            "AMT_INCOME_TOTAL": 1.0, "AMT_CREDIT": 2.0, "AMT_ANNUITY": 3.0,
            "AMT_GOODS_PRICE": 4.0, "DAYS_EMPLOYED": -5, "DAYS_BIRTH": -6,
            "EXT_SOURCE_2": 0.1, "EXT_SOURCE_3": 0.2, "TARGET": 1
        }"#;
        let row: LabeledApplication = serde_json::from_str(json).unwrap();

        assert_eq!(row.target, 1);
        assert_eq!(row.application.days_birth, -6);
    }
}
