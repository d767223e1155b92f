//! Feature derivation for default-risk model inference.
//!
//! Turns a cleaned applicant record into named numeric features: raw
//! numeric attributes pass through, domain ratios are computed, and each
//! categorical attribute becomes an indicator column for its observed value.
//! Names are normalized to the character set the classifier accepts.
//!
//! Ratios are not guarded: a zero or missing operand yields a non-finite
//! value, exactly as in the training batch.

use crate::cleaning::CleanedRecord;
use crate::error::{Result, ScoringError};
use crate::schema::SchemaRegistry;
use crate::types::application::Attribute;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

pub const CREDIT_INCOME_PERCENT: &str = "CREDIT_INCOME_PERCENT";
pub const ANNUITY_INCOME_PERCENT: &str = "ANNUITY_INCOME_PERCENT";
pub const CREDIT_TERM: &str = "CREDIT_TERM";
pub const GOODS_LOAN_RATIO: &str = "GOODS_LOAN_RATIO";
pub const ID_AGE_YEARS: &str = "ID_AGE_YEARS";
pub const ID_TO_AGE_RATIO: &str = "ID_TO_AGE_RATIO";

/// Ratio features in the order they are appended to the training table
pub const RATIO_FEATURES: [&str; 6] = [
    CREDIT_INCOME_PERCENT,
    ANNUITY_INCOME_PERCENT,
    CREDIT_TERM,
    GOODS_LOAN_RATIO,
    ID_AGE_YEARS,
    ID_TO_AGE_RATIO,
];

const DAYS_PER_YEAR: f64 = 365.0;

/// Strip everything outside `[A-Za-z0-9_]`
pub fn normalize_column_name(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect()
}

/// Raw indicator column name for a categorical value
pub fn indicator_name(attribute: &str, value: &str) -> String {
    format!("{attribute}_{value}")
}

/// Named feature values produced for one record.
///
/// Keeps the raw name behind each normalized name so that two distinct raw
/// names collapsing onto one feature are reported instead of merged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DerivedFeatures {
    values: BTreeMap<String, f64>,
    sources: HashMap<String, String>,
}

impl DerivedFeatures {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value under the normalized form of `raw_name`
    pub fn insert(&mut self, raw_name: &str, value: f64) -> Result<()> {
        let name = normalize_column_name(raw_name);
        if let Some(existing) = self.sources.get(&name) {
            if existing != raw_name {
                return Err(ScoringError::SchemaMismatch {
                    feature: name,
                    first: existing.clone(),
                    second: raw_name.to_string(),
                });
            }
        }
        self.sources.insert(name.clone(), raw_name.to_string());
        self.values.insert(name, value);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(name, value)| (name.as_str(), *value))
    }
}

/// Domain ratios computed from a cleaned record
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DomainRatios {
    pub credit_income_percent: f64,
    pub annuity_income_percent: f64,
    pub credit_term: f64,
    pub goods_loan_ratio: f64,
    pub id_age_years: f64,
    pub id_to_age_ratio: f64,
}

impl DomainRatios {
    pub fn compute(record: &CleanedRecord) -> Self {
        let id_age_years = record
            .days_id_publish
            .map_or(f64::NAN, |days| days.abs() / DAYS_PER_YEAR);
        let client_age_years = record.days_birth.abs() / DAYS_PER_YEAR;

        Self {
            credit_income_percent: record.amt_credit / record.amt_income_total,
            annuity_income_percent: record.amt_annuity / record.amt_income_total,
            credit_term: record.amt_credit / record.amt_annuity,
            goods_loan_ratio: record.amt_goods_price / record.amt_credit,
            id_age_years,
            id_to_age_ratio: id_age_years / client_age_years,
        }
    }

    /// Pairs in [`RATIO_FEATURES`] order
    pub fn named(&self) -> [(&'static str, f64); 6] {
        [
            (CREDIT_INCOME_PERCENT, self.credit_income_percent),
            (ANNUITY_INCOME_PERCENT, self.annuity_income_percent),
            (CREDIT_TERM, self.credit_term),
            (GOODS_LOAN_RATIO, self.goods_loan_ratio),
            (ID_AGE_YEARS, self.id_age_years),
            (ID_TO_AGE_RATIO, self.id_to_age_ratio),
        ]
    }
}

/// Feature extractor that transforms cleaned records into named features.
///
/// When built from a schema that records the raw category values seen in
/// training, a new value whose indicator name collides with a known one is
/// rejected as ambiguous.
#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor {
    known_categories: BTreeMap<String, Vec<String>>,
}

impl FeatureExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_schema(schema: &SchemaRegistry) -> Self {
        Self {
            known_categories: schema.metadata().categories.clone(),
        }
    }

    /// Derive the full named feature set for one record
    pub fn derive(&self, record: &CleanedRecord) -> Result<DerivedFeatures> {
        let mut features = DerivedFeatures::new();

        for (name, attribute) in record.attributes() {
            match attribute {
                Attribute::Numeric(value) => features.insert(name, value.unwrap_or(f64::NAN))?,
                Attribute::Categorical(Some(value)) => {
                    self.check_category(name, value)?;
                    features.insert(&indicator_name(name, value), 1.0)?;
                }
                Attribute::Categorical(None) | Attribute::Identifier(_) => {}
            }
        }

        for (name, value) in DomainRatios::compute(record).named() {
            features.insert(name, value)?;
        }

        debug!(
            sk_id_curr = record.sk_id_curr,
            features = features.len(),
            "Features derived"
        );

        Ok(features)
    }

    fn check_category(&self, attribute: &str, value: &str) -> Result<()> {
        let Some(known) = self.known_categories.get(attribute) else {
            return Ok(());
        };
        if known.iter().any(|k| k == value) {
            return Ok(());
        }

        let normalized = normalize_column_name(&indicator_name(attribute, value));
        match known
            .iter()
            .find(|k| normalize_column_name(&indicator_name(attribute, k)) == normalized)
        {
            Some(existing) => Err(ScoringError::SchemaMismatch {
                feature: normalized,
                first: indicator_name(attribute, existing),
                second: indicator_name(attribute, value),
            }),
            None => Ok(()),
        }
    }
}
