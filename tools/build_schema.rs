//! Schema Builder
//!
//! Fits the frozen feature schema from a labelled JSON-lines training file
//! and writes the metadata artifact the scorer loads at startup.
//!
//! Usage: build-schema <training.jsonl> [metadata.json] [model_version]
//!
//! The missing-value threshold and the default output location come from
//! `config/config.toml` (overridable via `CREDIT__...` environment variables).

use anyhow::{bail, Context};
use credit_risk_scoring::config::AppConfig;
use credit_risk_scoring::schema::{LabeledApplication, SchemaBuilder};
use std::path::PathBuf;
use tracing::{info, warn};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("build_schema=info".parse()?)
                .add_directive("credit_risk_scoring=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(input) = args.first() else {
        bail!("usage: build-schema <training.jsonl> [metadata.json] [model_version]");
    };

    let config = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Configuration not loaded, using defaults");
        AppConfig::default()
    });
    let output = args
        .get(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| config.artifacts.metadata_path());

    let contents =
        std::fs::read_to_string(input).with_context(|| format!("Failed to read {input}"))?;

    let mut rows = Vec::new();
    let mut skipped = 0usize;
    for (line_no, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let parsed = serde_json::from_str::<LabeledApplication>(line)
            .map_err(|e| e.to_string())
            .and_then(|row| {
                row.application
                    .validate()
                    .map(|_| row)
                    .map_err(|e| e.to_string())
            });
        match parsed {
            Ok(row) => rows.push(row),
            Err(e) => {
                skipped += 1;
                warn!(line = line_no + 1, error = %e, "Skipping training row");
            }
        }
    }

    info!(
        rows = rows.len(),
        skipped = skipped,
        missing_threshold_percent = config.cleaning.missing_threshold_percent,
        "Training rows loaded"
    );

    let mut builder =
        SchemaBuilder::new().with_missing_threshold(config.cleaning.missing_threshold_percent);
    if let Some(version) = args.get(2) {
        builder = builder.with_model_version(version.as_str());
    }

    let schema = builder.fit(&rows)?;

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    schema.save(&output)?;

    info!(
        features = schema.len(),
        dropped = ?schema.dropped_columns(),
        imbalance_ratio = ?schema.imbalance_ratio(),
        output = %output.display(),
        "Schema written"
    );

    Ok(())
}
