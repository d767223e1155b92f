//! Performance metrics and outcome statistics for the scoring pipeline.

use crate::pipeline::PipelineStage;
use crate::types::result::Decision;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

const LATENCY_WINDOW: usize = 10_000;

/// Metrics collector for pipeline performance
pub struct PipelineMetrics {
    /// Applications that produced a result
    pub applications_scored: AtomicU64,
    /// Applications that failed at any stage
    pub applications_failed: AtomicU64,
    /// Failures keyed by the stage they occurred in
    failures_by_stage: RwLock<HashMap<PipelineStage, u64>>,
    /// Results keyed by decision
    decisions: RwLock<HashMap<Decision, u64>>,
    /// Pipeline latencies (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    /// Probability of default distribution buckets
    probability_buckets: RwLock<[u64; 10]>,
    start_time: Instant,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            applications_scored: AtomicU64::new(0),
            applications_failed: AtomicU64::new(0),
            failures_by_stage: RwLock::new(HashMap::new()),
            decisions: RwLock::new(HashMap::new()),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            probability_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record a scored application
    pub fn record_scored(&self, processing_time: Duration, probability: f64, decision: Decision) {
        self.applications_scored.fetch_add(1, Ordering::Relaxed);
        self.record_latency(processing_time);

        let bucket = (probability * 10.0).clamp(0.0, 9.0) as usize;
        if let Ok(mut buckets) = self.probability_buckets.write() {
            buckets[bucket] += 1;
        }

        if let Ok(mut decisions) = self.decisions.write() {
            *decisions.entry(decision).or_insert(0) += 1;
        }
    }

    /// Record an application that ended in `Failed`
    pub fn record_failure(&self, processing_time: Duration, stage: PipelineStage) {
        self.applications_failed.fetch_add(1, Ordering::Relaxed);
        self.record_latency(processing_time);

        if let Ok(mut by_stage) = self.failures_by_stage.write() {
            *by_stage.entry(stage).or_insert(0) += 1;
        }
    }

    fn record_latency(&self, processing_time: Duration) {
        if let Ok(mut times) = self.processing_times.write() {
            times.push(processing_time.as_micros() as u64);
            if times.len() > LATENCY_WINDOW {
                times.drain(0..LATENCY_WINDOW / 2);
            }
        }
    }

    pub fn total(&self) -> u64 {
        self.applications_scored.load(Ordering::Relaxed)
            + self.applications_failed.load(Ordering::Relaxed)
    }

    /// Get processing time statistics
    pub fn get_processing_stats(&self) -> ProcessingStats {
        let Ok(times) = self.processing_times.read() else {
            return ProcessingStats::default();
        };
        if times.is_empty() {
            return ProcessingStats::default();
        }

        let mut sorted: Vec<u64> = times.clone();
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();
        let at = |q: f64| sorted[((count as f64 * q) as usize).min(count - 1)];

        ProcessingStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: at(0.50),
            p95_us: at(0.95),
            p99_us: at(0.99),
            max_us: sorted[count - 1],
        }
    }

    /// Applications per second since start
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.total() as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn get_probability_distribution(&self) -> [u64; 10] {
        self.probability_buckets
            .read()
            .map(|buckets| *buckets)
            .unwrap_or_default()
    }

    pub fn get_decisions(&self) -> HashMap<Decision, u64> {
        self.decisions
            .read()
            .map(|d| d.clone())
            .unwrap_or_default()
    }

    pub fn get_failures_by_stage(&self) -> HashMap<PipelineStage, u64> {
        self.failures_by_stage
            .read()
            .map(|f| f.clone())
            .unwrap_or_default()
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let scored = self.applications_scored.load(Ordering::Relaxed);
        let failed = self.applications_failed.load(Ordering::Relaxed);
        let processing = self.get_processing_stats();
        let decisions = self.get_decisions();
        let failures = self.get_failures_by_stage();
        let distribution = self.get_probability_distribution();

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║             CREDIT RISK SCORING - METRICS SUMMARY            ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Applications Scored: {:>8}  │  Throughput: {:>6.1} app/s  ║",
            scored,
            self.get_throughput()
        );
        info!("║ Applications Failed: {:>8}                                 ║", failed);
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Latency (μs): mean={:>5} p50={:>5} p95={:>5} p99={:>5}      ║",
            processing.mean_us, processing.p50_us, processing.p95_us, processing.p99_us
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Decisions:                                                   ║");
        for decision in [Decision::Approve, Decision::ManualReview, Decision::Reject] {
            let count = decisions.get(&decision).copied().unwrap_or(0);
            let pct = if scored > 0 {
                (count as f64 / scored as f64) * 100.0
            } else {
                0.0
            };
            info!(
                "║   {:14}: {:>6} ({:>5.1}%)                           ║",
                decision.as_str(),
                count,
                pct
            );
        }
        if !failures.is_empty() {
            info!("╠══════════════════════════════════════════════════════════════╣");
            info!("║ Failures by Stage:                                           ║");
            for (stage, count) in &failures {
                info!(
                    "║   {:14}: {:>6}                                     ║",
                    stage.as_str(),
                    count
                );
            }
        }
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Probability of Default Distribution:                         ║");
        let total: u64 = distribution.iter().sum();
        for (i, &count) in distribution.iter().enumerate() {
            let pct = if total > 0 { (count as f64 / total as f64) * 100.0 } else { 0.0 };
            let bar: String = "█".repeat(((pct / 2.0) as usize).min(20));
            info!(
                "║   {:.1}-{:.1}: {:>6} ({:>5.1}%) {}",
                i as f64 / 10.0,
                (i + 1) as f64 / 10.0,
                count,
                pct,
                bar
            );
        }
        info!("╚══════════════════════════════════════════════════════════════╝");
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Processing time statistics
#[derive(Debug, Default)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Periodic metrics reporter
pub struct MetricsReporter {
    metrics: Arc<PipelineMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<PipelineMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        // first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}
