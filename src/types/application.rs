//! Loan application records
//!
//! [`LoanApplication`] is the validated wire shape received from callers.
//! [`ApplicantRecord`] is the typed record the cleaning and derivation
//! stages operate on, with explicit missing-value markers.

use crate::error::{Result, ScoringError};
use serde::{Deserialize, Serialize};

/// Attribute names as they appear on the wire and in the trained schema
pub mod columns {
    pub const SK_ID_CURR: &str = "SK_ID_CURR";
    pub const NAME_CONTRACT_TYPE: &str = "NAME_CONTRACT_TYPE";
    pub const CODE_GENDER: &str = "CODE_GENDER";
    pub const AMT_INCOME_TOTAL: &str = "AMT_INCOME_TOTAL";
    pub const AMT_CREDIT: &str = "AMT_CREDIT";
    pub const AMT_ANNUITY: &str = "AMT_ANNUITY";
    pub const AMT_GOODS_PRICE: &str = "AMT_GOODS_PRICE";
    pub const DAYS_EMPLOYED: &str = "DAYS_EMPLOYED";
    pub const DAYS_BIRTH: &str = "DAYS_BIRTH";
    pub const DAYS_ID_PUBLISH: &str = "DAYS_ID_PUBLISH";
    pub const EXT_SOURCE_1: &str = "EXT_SOURCE_1";
    pub const EXT_SOURCE_2: &str = "EXT_SOURCE_2";
    pub const EXT_SOURCE_3: &str = "EXT_SOURCE_3";
    pub const NAME_EDUCATION_TYPE: &str = "NAME_EDUCATION_TYPE";
    pub const NAME_FAMILY_STATUS: &str = "NAME_FAMILY_STATUS";
    pub const DAYS_EMPLOYED_ANOM: &str = "DAYS_EMPLOYED_ANOM";
}

/// Loan application as submitted by a caller.
///
/// Required attributes fail deserialization when absent or of the wrong
/// JSON type. Unknown keys are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanApplication {
    /// Applicant identifier
    #[serde(rename = "SK_ID_CURR")]
    pub sk_id_curr: i64,

    /// Contract type ("Cash loans", "Revolving loans")
    #[serde(rename = "NAME_CONTRACT_TYPE")]
    pub name_contract_type: String,

    /// Gender code ("M", "F"; "XNA" is rejected during cleaning)
    #[serde(rename = "CODE_GENDER")]
    pub code_gender: String,

    #[serde(rename = "AMT_INCOME_TOTAL")]
    pub amt_income_total: f64,

    #[serde(rename = "AMT_CREDIT")]
    pub amt_credit: f64,

    #[serde(rename = "AMT_ANNUITY")]
    pub amt_annuity: f64,

    #[serde(rename = "AMT_GOODS_PRICE")]
    pub amt_goods_price: f64,

    /// Days employed before the application (negative); 365243 means not employed
    #[serde(rename = "DAYS_EMPLOYED")]
    pub days_employed: i64,

    /// Age in days before the application (negative)
    #[serde(rename = "DAYS_BIRTH")]
    pub days_birth: i64,

    /// External bureau score in [0, 1]
    #[serde(rename = "EXT_SOURCE_2")]
    pub ext_source_2: f64,

    /// External bureau score in [0, 1]
    #[serde(rename = "EXT_SOURCE_3")]
    pub ext_source_3: f64,

    /// Days since the identity document was issued (negative)
    #[serde(rename = "DAYS_ID_PUBLISH", default, skip_serializing_if = "Option::is_none")]
    pub days_id_publish: Option<i64>,

    #[serde(rename = "NAME_EDUCATION_TYPE", default, skip_serializing_if = "Option::is_none")]
    pub name_education_type: Option<String>,

    #[serde(rename = "NAME_FAMILY_STATUS", default, skip_serializing_if = "Option::is_none")]
    pub name_family_status: Option<String>,

    #[serde(rename = "EXT_SOURCE_1", default, skip_serializing_if = "Option::is_none")]
    pub ext_source_1: Option<f64>,
}

impl LoanApplication {
    /// Parse and validate an application from an untyped JSON object
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let application: Self = serde_json::from_value(value)
            .map_err(|e| ScoringError::validation(e.to_string()))?;
        application.validate()?;
        Ok(application)
    }

    /// Parse and validate an application from a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        let application: Self =
            serde_json::from_str(json).map_err(|e| ScoringError::validation(e.to_string()))?;
        application.validate()?;
        Ok(application)
    }

    /// Range checks that the type system cannot express.
    pub fn validate(&self) -> Result<()> {
        let amounts = [
            (columns::AMT_INCOME_TOTAL, self.amt_income_total),
            (columns::AMT_CREDIT, self.amt_credit),
            (columns::AMT_ANNUITY, self.amt_annuity),
            (columns::AMT_GOODS_PRICE, self.amt_goods_price),
        ];
        for (name, amount) in amounts {
            if !amount.is_finite() || amount < 0.0 {
                return Err(ScoringError::validation(format!(
                    "{name} must be a non-negative number, got {amount}"
                )));
            }
        }

        let scores = [
            (columns::EXT_SOURCE_1, self.ext_source_1),
            (columns::EXT_SOURCE_2, Some(self.ext_source_2)),
            (columns::EXT_SOURCE_3, Some(self.ext_source_3)),
        ];
        for (name, score) in scores {
            if let Some(score) = score {
                if !(0.0..=1.0).contains(&score) {
                    return Err(ScoringError::validation(format!(
                        "{name} must be within [0, 1], got {score}"
                    )));
                }
            }
        }

        if self.name_contract_type.is_empty() {
            return Err(ScoringError::validation(format!(
                "{} must not be empty",
                columns::NAME_CONTRACT_TYPE
            )));
        }

        Ok(())
    }
}

/// A single attribute value viewed generically by name
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Attribute<'a> {
    /// Numeric value; `None` is the missing-value marker
    Numeric(Option<f64>),
    /// Categorical value; `None` when the attribute was not supplied
    Categorical(Option<&'a str>),
    /// Row identifier, never a model input
    Identifier(i64),
}

impl Attribute<'_> {
    pub fn is_missing(&self) -> bool {
        match self {
            Attribute::Numeric(value) => value.map_or(true, f64::is_nan),
            Attribute::Categorical(value) => value.is_none(),
            Attribute::Identifier(_) => false,
        }
    }
}

/// Typed applicant record flowing through cleaning and derivation
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicantRecord {
    pub sk_id_curr: i64,
    pub name_contract_type: String,
    pub code_gender: String,
    pub amt_income_total: f64,
    pub amt_credit: f64,
    pub amt_annuity: f64,
    pub amt_goods_price: f64,
    /// `None` once the unemployment sentinel has been normalized
    pub days_employed: Option<f64>,
    pub days_birth: f64,
    pub days_id_publish: Option<f64>,
    pub ext_source_1: Option<f64>,
    pub ext_source_2: f64,
    pub ext_source_3: f64,
    pub name_education_type: Option<String>,
    pub name_family_status: Option<String>,
    /// Set when `days_employed` held the unemployment sentinel
    pub days_employed_anom: bool,
}

impl ApplicantRecord {
    /// All attributes in column order, anomaly flag last.
    pub fn attributes(&self) -> Vec<(&'static str, Attribute<'_>)> {
        vec![
            (columns::SK_ID_CURR, Attribute::Identifier(self.sk_id_curr)),
            (
                columns::NAME_CONTRACT_TYPE,
                Attribute::Categorical(Some(self.name_contract_type.as_str())),
            ),
            (
                columns::CODE_GENDER,
                Attribute::Categorical(Some(self.code_gender.as_str())),
            ),
            (
                columns::AMT_INCOME_TOTAL,
                Attribute::Numeric(Some(self.amt_income_total)),
            ),
            (columns::AMT_CREDIT, Attribute::Numeric(Some(self.amt_credit))),
            (columns::AMT_ANNUITY, Attribute::Numeric(Some(self.amt_annuity))),
            (
                columns::AMT_GOODS_PRICE,
                Attribute::Numeric(Some(self.amt_goods_price)),
            ),
            (columns::DAYS_EMPLOYED, Attribute::Numeric(self.days_employed)),
            (columns::DAYS_BIRTH, Attribute::Numeric(Some(self.days_birth))),
            (columns::DAYS_ID_PUBLISH, Attribute::Numeric(self.days_id_publish)),
            (columns::EXT_SOURCE_1, Attribute::Numeric(self.ext_source_1)),
            (columns::EXT_SOURCE_2, Attribute::Numeric(Some(self.ext_source_2))),
            (columns::EXT_SOURCE_3, Attribute::Numeric(Some(self.ext_source_3))),
            (
                columns::NAME_EDUCATION_TYPE,
                Attribute::Categorical(self.name_education_type.as_deref()),
            ),
            (
                columns::NAME_FAMILY_STATUS,
                Attribute::Categorical(self.name_family_status.as_deref()),
            ),
            (
                columns::DAYS_EMPLOYED_ANOM,
                Attribute::Numeric(Some(if self.days_employed_anom { 1.0 } else { 0.0 })),
            ),
        ]
    }
}

impl From<LoanApplication> for ApplicantRecord {
    fn from(app: LoanApplication) -> Self {
        Self {
            sk_id_curr: app.sk_id_curr,
            name_contract_type: app.name_contract_type,
            code_gender: app.code_gender,
            amt_income_total: app.amt_income_total,
            amt_credit: app.amt_credit,
            amt_annuity: app.amt_annuity,
            amt_goods_price: app.amt_goods_price,
            days_employed: Some(app.days_employed as f64),
            days_birth: app.days_birth as f64,
            days_id_publish: app.days_id_publish.map(|d| d as f64),
            ext_source_1: app.ext_source_1,
            ext_source_2: app.ext_source_2,
            ext_source_3: app.ext_source_3,
            name_education_type: app.name_education_type,
            name_family_status: app.name_family_status,
            days_employed_anom: false,
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_application() -> LoanApplication {
    LoanApplication {
        sk_id_curr: 100002,
        name_contract_type: "Cash loans".to_string(),
        code_gender: "M".to_string(),
        amt_income_total: 200_000.0,
        amt_credit: 1_000_000.0,
        amt_annuity: 50_000.0,
        amt_goods_price: 900_000.0,
        days_employed: -500,
        days_birth: -10_000,
        ext_source_2: 0.5,
        ext_source_3: 0.5,
        days_id_publish: None,
        name_education_type: None,
        name_family_status: None,
        ext_source_1: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_json() -> serde_json::Value {
        json!({
            "SK_ID_CURR": 100002, "NAME_CONTRACT_TYPE": "Cash loans", "CODE_GENDER": "M",
            "AMT_INCOME_TOTAL": 200000, "AMT_CREDIT": 1000000, "AMT_ANNUITY": 50000,
            "AMT_GOODS_PRICE": 900000, "DAYS_EMPLOYED": -500, "DAYS_BIRTH": -10000,
            "EXT_SOURCE_2": 0.5, "EXT_SOURCE_3": 0.5
        })
    }

    #[test]
    fn test_parse_required_attributes() {
        let app = LoanApplication::from_value(sample_json()).unwrap();
        assert_eq!(app, sample_application());
    }

    #[test]
    fn test_missing_required_attribute() {
        let mut value = sample_json();
        value.as_object_mut().unwrap().remove("AMT_CREDIT");

        let err = LoanApplication::from_value(value).unwrap_err();
        assert!(matches!(err, ScoringError::Validation(ref m) if m.contains("AMT_CREDIT")));
    }

    #[test]
    fn test_type_mismatch() {
        let mut value = sample_json();
        value["DAYS_BIRTH"] = json!("ten thousand");

        let err = LoanApplication::from_value(value).unwrap_err();
        assert!(matches!(err, ScoringError::Validation(_)));
    }

    #[test]
    fn test_range_checks() {
        let mut app = sample_application();
        app.ext_source_2 = 1.5;
        assert!(app.validate().is_err());

        let mut app = sample_application();
        app.amt_credit = -1.0;
        assert!(app.validate().is_err());

        let mut app = sample_application();
        app.amt_income_total = 0.0;
        assert!(app.validate().is_ok());
    }

    #[test]
    fn test_optional_attributes_and_unknown_keys() {
        let mut value = sample_json();
        value["DAYS_ID_PUBLISH"] = json!(-2000);
        value["NAME_FAMILY_STATUS"] = json!("Married");
        value["SOMETHING_ELSE"] = json!(true);

        let app = LoanApplication::from_value(value).unwrap();
        assert_eq!(app.days_id_publish, Some(-2000));
        assert_eq!(app.name_family_status.as_deref(), Some("Married"));
        assert_eq!(app.ext_source_1, None);
    }

    #[test]
    fn test_record_attributes_order() {
        let record = ApplicantRecord::from(sample_application());
        let names: Vec<&str> = record.attributes().iter().map(|(n, _)| *n).collect();

        assert_eq!(names.first(), Some(&columns::SK_ID_CURR));
        assert_eq!(names.last(), Some(&columns::DAYS_EMPLOYED_ANOM));
        assert_eq!(names.len(), 16);
    }

    #[test]
    fn test_attribute_missing() {
        assert!(Attribute::Numeric(None).is_missing());
        assert!(Attribute::Numeric(Some(f64::NAN)).is_missing());
        assert!(!Attribute::Numeric(Some(0.0)).is_missing());
        assert!(Attribute::Categorical(None).is_missing());
        assert!(!Attribute::Identifier(1).is_missing());
    }
}
