//! Record cleaning applied before feature derivation.
//!
//! At serving time only the per-record rules run: the unemployment sentinel
//! in `DAYS_EMPLOYED` is normalized to a missing value with a companion flag,
//! and the invalid gender sentinel is rejected. Sparse-column pruning is a
//! population decision frozen into the [`SchemaRegistry`]; it is applied here
//! by name and never recomputed from a single row.

use crate::error::{Result, ScoringError};
use crate::schema::SchemaRegistry;
use crate::types::application::{columns, ApplicantRecord, Attribute};
use std::collections::BTreeSet;
use std::ops::Deref;
use tracing::debug;

/// Sentinel meaning "not currently employed"
pub const DAYS_EMPLOYED_SENTINEL: f64 = 365_243.0;

/// Gender code that marks a structurally invalid row
pub const INVALID_GENDER: &str = "XNA";

/// Default population missing-rate limit (percent) above which an attribute is pruned
pub const DEFAULT_MISSING_THRESHOLD: f64 = 50.0;

/// Applicant record after cleaning
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedRecord {
    record: ApplicantRecord,
    pruned: BTreeSet<String>,
}

impl CleanedRecord {
    /// Attributes that survive pruning, in column order
    pub fn attributes(&self) -> Vec<(&'static str, Attribute<'_>)> {
        self.record
            .attributes()
            .into_iter()
            .filter(|(name, _)| !self.pruned.contains(*name))
            .collect()
    }

    pub fn pruned(&self) -> &BTreeSet<String> {
        &self.pruned
    }

    pub fn into_inner(self) -> ApplicantRecord {
        self.record
    }
}

impl Deref for CleanedRecord {
    type Target = ApplicantRecord;

    fn deref(&self) -> &Self::Target {
        &self.record
    }
}

/// Per-record cleaning rules
#[derive(Debug, Clone, Default)]
pub struct CleaningStage {
    pruned: BTreeSet<String>,
}

impl CleaningStage {
    /// Cleaning with no pruned columns
    pub fn new() -> Self {
        Self::default()
    }

    /// Cleaning that applies the pruning decisions frozen in the registry
    pub fn from_schema(schema: &SchemaRegistry) -> Self {
        Self {
            pruned: schema.dropped_columns().iter().cloned().collect(),
        }
    }

    /// Clean a single record.
    ///
    /// Rejects the invalid gender sentinel with a validation error. Running
    /// this on an already-cleaned record is a no-op.
    pub fn clean(&self, record: ApplicantRecord) -> Result<CleanedRecord> {
        check_gender(&record)?;
        let record = correct_employment_anomaly(record);

        debug!(
            sk_id_curr = record.sk_id_curr,
            days_employed_anom = record.days_employed_anom,
            pruned = self.pruned.len(),
            "Record cleaned"
        );

        Ok(CleanedRecord {
            record,
            pruned: self.pruned.clone(),
        })
    }
}

/// Replace the unemployment sentinel with the missing marker and raise the flag.
///
/// The flag is only ever set, never cleared, so a second pass leaves it intact.
pub fn correct_employment_anomaly(mut record: ApplicantRecord) -> ApplicantRecord {
    if record.days_employed == Some(DAYS_EMPLOYED_SENTINEL) {
        record.days_employed = None;
        record.days_employed_anom = true;
    }
    record
}

/// Whether a record carries the invalid gender sentinel
pub fn has_invalid_gender(record: &ApplicantRecord) -> bool {
    record.code_gender == INVALID_GENDER
}

fn check_gender(record: &ApplicantRecord) -> Result<()> {
    if has_invalid_gender(record) {
        return Err(ScoringError::validation(format!(
            "{} '{}' is not a valid category",
            columns::CODE_GENDER,
            INVALID_GENDER
        )));
    }
    Ok(())
}

/// Attributes whose missing rate across `records` exceeds `threshold_percent`.
///
/// Training-time only; the result is frozen into the schema metadata.
pub fn sparse_columns(records: &[ApplicantRecord], threshold_percent: f64) -> Vec<String> {
    let Some(first) = records.first() else {
        return Vec::new();
    };

    let names: Vec<&'static str> = first.attributes().iter().map(|(name, _)| *name).collect();
    let mut missing = vec![0usize; names.len()];

    for record in records {
        for (slot, (_, attribute)) in missing.iter_mut().zip(record.attributes()) {
            if attribute.is_missing() {
                *slot += 1;
            }
        }
    }

    names
        .into_iter()
        .zip(missing)
        .filter(|(_, count)| 100.0 * *count as f64 / records.len() as f64 > threshold_percent)
        .map(|(name, _)| name.to_string())
        .collect()
}
