//! Credit Risk Scorer - Main Entry Point
//!
//! Loads the trained artifacts once, scores a JSON-lines file of loan
//! applications across a bounded pool of workers, and writes one decision
//! per input line in input order.

use anyhow::{Context, Result};
use credit_risk_scoring::{
    batch::BatchScorer,
    config::{AppConfig, LoggingConfig},
    metrics::{MetricsReporter, PipelineMetrics},
    pipeline::InferencePipeline,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/config.toml".to_string());
    let config = AppConfig::load_from_path(&config_path)
        .with_context(|| format!("Failed to load configuration from {config_path}"))?;

    init_tracing(&config.logging)?;

    info!("Starting Credit Risk Scorer");
    info!(
        "Decision thresholds: review>={:.2}, reject>={:.2}",
        config.decision.review_threshold, config.decision.reject_threshold
    );

    // Artifact failures are fatal at startup
    let pipeline = Arc::new(InferencePipeline::from_config(&config)?);
    info!(
        "Inference pipeline initialized ({} features, model {})",
        pipeline.schema().len(),
        pipeline.schema().model_version()
    );

    let input = tokio::fs::read_to_string(&config.batch.input_path)
        .await
        .with_context(|| format!("Failed to read applications from {}", config.batch.input_path))?;
    let lines: Vec<String> = input
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    let metrics = Arc::new(PipelineMetrics::new());
    let reporter = tokio::spawn(MetricsReporter::new(metrics.clone(), 30).start());

    info!(
        applications = lines.len(),
        workers = config.pipeline.workers,
        timeout_ms = config.pipeline.timeout_ms,
        input = %config.batch.input_path,
        "Scoring batch"
    );

    let scorer = BatchScorer::from_config(pipeline, metrics.clone(), &config.pipeline);
    let decisions = scorer.score_lines(lines).await;

    let mut output = String::new();
    for decision in &decisions {
        output.push_str(&serde_json::to_string(decision)?);
        output.push('\n');
    }
    tokio::fs::write(&config.batch.output_path, output)
        .await
        .with_context(|| format!("Failed to write decisions to {}", config.batch.output_path))?;

    reporter.abort();
    info!(
        written = decisions.len(),
        output = %config.batch.output_path,
        "Batch complete"
    );
    metrics.print_summary();

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| {
        EnvFilter::try_new(format!(
            "credit_risk_scoring={level},credit_scorer={level}",
            level = logging.level
        ))
    })?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}
