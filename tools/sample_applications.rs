//! Sample Application Generator
//!
//! Writes synthetic loan applications as JSON lines, for exercising the
//! batch scorer and, with `--labeled`, for fitting a schema.
//!
//! Usage: sample-applications [output] [count] [high_risk_rate] [invalid_rate] [--labeled]

use anyhow::Context;
use credit_risk_scoring::schema::LabeledApplication;
use credit_risk_scoring::types::{columns, LoanApplication};
use rand::Rng;
use serde_json::Value;
use tracing::info;

const NOT_EMPLOYED: i64 = 365_243;

/// Application generator for testing
struct ApplicationGenerator {
    rng: rand::rngs::ThreadRng,
    application_counter: i64,
}

impl ApplicationGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
            application_counter: 100_000,
        }
    }

    /// Generate an applicant with stable employment and strong bureau scores
    fn generate_low_risk(&mut self) -> LoanApplication {
        self.application_counter += 1;

        let income = self.rng.gen_range(120_000.0..400_000.0);
        let credit = income * self.rng.gen_range(1.0..3.0);
        let annuity = credit / self.rng.gen_range(15.0..30.0);

        LoanApplication {
            sk_id_curr: self.application_counter,
            name_contract_type: self.random_choice(&["Cash loans", "Revolving loans"]).to_string(),
            code_gender: self.random_choice(&["M", "F"]).to_string(),
            amt_income_total: round_amount(income),
            amt_credit: round_amount(credit),
            amt_annuity: round_amount(annuity),
            amt_goods_price: round_amount(credit * self.rng.gen_range(0.85..1.0)),
            days_employed: -self.rng.gen_range(1_000..10_000),
            days_birth: -self.rng.gen_range(12_000..22_000),
            ext_source_2: self.rng.gen_range(0.5..0.85),
            ext_source_3: self.rng.gen_range(0.45..0.9),
            days_id_publish: Some(-self.rng.gen_range(1_000..5_000)),
            name_education_type: Some(
                self.random_choice(&["Higher education", "Secondary / secondary special"])
                    .to_string(),
            ),
            name_family_status: Some(
                self.random_choice(&["Married", "Civil marriage"]).to_string(),
            ),
            ext_source_1: self.rng.gen_bool(0.4).then(|| self.rng.gen_range(0.4..0.9)),
        }
    }

    /// Generate an applicant with high leverage and weak bureau scores
    fn generate_high_risk(&mut self) -> LoanApplication {
        self.application_counter += 1;

        let income = self.rng.gen_range(40_000.0..120_000.0);
        let credit = income * self.rng.gen_range(4.0..10.0);
        let annuity = credit / self.rng.gen_range(8.0..15.0);
        let days_employed = if self.rng.gen_bool(0.3) {
            NOT_EMPLOYED
        } else {
            -self.rng.gen_range(30..700)
        };

        LoanApplication {
            sk_id_curr: self.application_counter,
            name_contract_type: "Cash loans".to_string(),
            code_gender: self.random_choice(&["M", "F"]).to_string(),
            amt_income_total: round_amount(income),
            amt_credit: round_amount(credit),
            amt_annuity: round_amount(annuity),
            amt_goods_price: round_amount(credit * self.rng.gen_range(0.7..0.95)),
            days_employed,
            days_birth: -self.rng.gen_range(7_500..12_000),
            ext_source_2: self.rng.gen_range(0.0..0.35),
            ext_source_3: self.rng.gen_range(0.0..0.3),
            days_id_publish: self
                .rng
                .gen_bool(0.9)
                .then(|| -self.rng.gen_range(0..800)),
            name_education_type: self.rng.gen_bool(0.5).then(|| {
                self.random_choice(&["Secondary / secondary special", "Lower secondary"])
                    .to_string()
            }),
            name_family_status: Some(
                self.random_choice(&["Single / not married", "Separated", "Widow"])
                    .to_string(),
            ),
            ext_source_1: None,
        }
    }

    /// Generate an application the scorer must reject before scoring
    fn generate_invalid(&mut self) -> anyhow::Result<Value> {
        let mut application = self.generate_low_risk();
        if self.rng.gen_bool(0.5) {
            application.code_gender = "XNA".to_string();
            return Ok(serde_json::to_value(application)?);
        }

        let mut value = serde_json::to_value(application)?;
        let missing = self.random_choice(&[
            columns::AMT_ANNUITY,
            columns::EXT_SOURCE_2,
            columns::DAYS_BIRTH,
        ]);
        if let Some(object) = value.as_object_mut() {
            object.remove(missing);
        }
        Ok(value)
    }

    fn random_choice<'a>(&mut self, choices: &[&'a str]) -> &'a str {
        choices[self.rng.gen_range(0..choices.len())]
    }
}

fn round_amount(amount: f64) -> f64 {
    (amount / 100.0).round() * 100.0
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sample_applications=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let labeled = args.iter().any(|a| a == "--labeled");
    let positional: Vec<&str> = args
        .iter()
        .filter(|a| !a.starts_with("--"))
        .map(String::as_str)
        .collect();

    let output = positional.first().copied().unwrap_or("data/applications.jsonl");
    let count: u64 = positional.get(1).and_then(|s| s.parse().ok()).unwrap_or(100);
    let high_risk_rate: f64 = positional.get(2).and_then(|s| s.parse().ok()).unwrap_or(0.2);
    let invalid_rate: f64 = positional.get(3).and_then(|s| s.parse().ok()).unwrap_or(0.02);

    info!(
        output = %output,
        count = count,
        high_risk_rate = high_risk_rate,
        invalid_rate = invalid_rate,
        labeled = labeled,
        "Configuration loaded"
    );

    let mut generator = ApplicationGenerator::new();
    let mut rng = rand::thread_rng();

    let mut low_risk_count = 0;
    let mut high_risk_count = 0;
    let mut invalid_count = 0;
    let mut lines = String::new();

    for _ in 0..count {
        let line = if labeled {
            let high_risk = rng.gen_bool(high_risk_rate);
            let application = if high_risk {
                high_risk_count += 1;
                generator.generate_high_risk()
            } else {
                low_risk_count += 1;
                generator.generate_low_risk()
            };
            // labels are noisy so both classes appear in each segment
            let default_rate = if high_risk { 0.6 } else { 0.05 };
            let row = LabeledApplication {
                application,
                target: u8::from(rng.gen_bool(default_rate)),
            };
            serde_json::to_string(&row)?
        } else if rng.gen_bool(invalid_rate) {
            invalid_count += 1;
            serde_json::to_string(&generator.generate_invalid()?)?
        } else if rng.gen_bool(high_risk_rate) {
            high_risk_count += 1;
            serde_json::to_string(&generator.generate_high_risk())?
        } else {
            low_risk_count += 1;
            serde_json::to_string(&generator.generate_low_risk())?
        };
        lines.push_str(&line);
        lines.push('\n');
    }

    if let Some(parent) = std::path::Path::new(output).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    std::fs::write(output, lines).with_context(|| format!("Failed to write {output}"))?;

    info!(
        "Completed! Wrote {} applications ({} low risk, {} high risk, {} invalid)",
        count, low_risk_count, high_risk_count, invalid_count
    );

    Ok(())
}
