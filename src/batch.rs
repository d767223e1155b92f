//! Concurrent scoring of JSON-lines batches.
//!
//! Each line runs the whole pipeline on the blocking pool under a per-call
//! timeout. A worker permit is held by the blocking task itself, so a call
//! that timed out keeps its permit until it actually finishes and at most
//! `workers` pipeline calls ever run at once.

use crate::config::PipelineConfig;
use crate::error::ScoringError;
use crate::metrics::PipelineMetrics;
use crate::pipeline::{InferencePipeline, PipelineStage, StageFailure};
use crate::types::application::columns;
use crate::types::result::{ScoreResponse, ScoreResult, ScoredApplication};
use futures::StreamExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

const PROGRESS_EVERY: usize = 1000;

/// Bounded worker pool over a shared [`InferencePipeline`]
pub struct BatchScorer {
    pipeline: Arc<InferencePipeline>,
    metrics: Arc<PipelineMetrics>,
    permits: Arc<Semaphore>,
    workers: usize,
    timeout: Duration,
}

impl BatchScorer {
    pub fn new(
        pipeline: Arc<InferencePipeline>,
        metrics: Arc<PipelineMetrics>,
        workers: usize,
        timeout: Duration,
    ) -> Self {
        let workers = workers.max(1);
        Self {
            pipeline,
            metrics,
            permits: Arc::new(Semaphore::new(workers)),
            workers,
            timeout,
        }
    }

    pub fn from_config(
        pipeline: Arc<InferencePipeline>,
        metrics: Arc<PipelineMetrics>,
        config: &PipelineConfig,
    ) -> Self {
        Self::new(
            pipeline,
            metrics,
            config.workers,
            Duration::from_millis(config.timeout_ms),
        )
    }

    /// Score every line, returning one response per line in input order
    pub async fn score_lines(&self, lines: Vec<String>) -> Vec<ScoredApplication> {
        let total = lines.len();
        futures::stream::iter(lines.into_iter().enumerate())
            .map(|(index, line)| async move {
                let scored = self.score_line(line).await;
                if (index + 1) % PROGRESS_EVERY == 0 {
                    info!(
                        processed = index + 1,
                        total = total,
                        throughput = format!("{:.1} app/s", self.metrics.get_throughput()),
                        "Processing milestone"
                    );
                }
                scored
            })
            .buffered(self.workers)
            .collect()
            .await
    }

    /// Score one input line
    pub async fn score_line(&self, line: String) -> ScoredApplication {
        let start_time = Instant::now();

        let value: serde_json::Value = match serde_json::from_str(&line) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "Failed to deserialize application");
                self.metrics
                    .record_failure(start_time.elapsed(), PipelineStage::Idle);
                let error = ScoringError::validation(format!("malformed JSON: {e}"));
                return ScoredApplication::new(
                    None,
                    ScoreResponse::Failed {
                        error: error.to_string(),
                    },
                );
            }
        };
        let sk_id_curr = value
            .get(columns::SK_ID_CURR)
            .and_then(serde_json::Value::as_i64);

        let outcome = self.run_pipeline(value).await;
        let processing_time = start_time.elapsed();

        let response = match outcome {
            Ok(result) => {
                self.metrics.record_scored(
                    processing_time,
                    result.probability_default,
                    result.decision,
                );
                debug!(
                    sk_id_curr = ?sk_id_curr,
                    probability = result.probability_default,
                    credit_score = result.credit_score,
                    decision = result.decision.as_str(),
                    processing_time_us = processing_time.as_micros(),
                    "Application scored"
                );
                ScoreResponse::Scored(result)
            }
            Err(failure) => {
                self.metrics.record_failure(processing_time, failure.stage);
                ScoreResponse::Failed {
                    error: failure.to_string(),
                }
            }
        };

        ScoredApplication::new(sk_id_curr, response)
    }

    async fn run_pipeline(&self, value: serde_json::Value) -> Result<ScoreResult, StageFailure> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|e| aborted(format!("worker pool closed: {e}")))?;

        let pipeline = Arc::clone(&self.pipeline);
        let task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            pipeline.score_value(value)
        });

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => Err(aborted(format!("scoring task aborted: {e}"))),
            Err(_) => Err(aborted(format!(
                "scoring timed out after {} ms",
                self.timeout.as_millis()
            ))),
        }
    }
}

fn aborted(reason: String) -> StageFailure {
    StageFailure {
        stage: PipelineStage::Failed,
        error: ScoringError::inference(reason),
    }
}
