//! Request metrics and statistics tracking for the prediction service.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

const MAX_SAMPLES: usize = 10_000;

/// Metrics collector for the serving layer
pub struct PipelineMetrics {
    /// Total prediction requests received
    pub requests_total: AtomicU64,
    /// Requests that produced a prediction
    pub predictions_ok: AtomicU64,
    /// Failures by error kind
    failures_by_kind: RwLock<BTreeMap<String, u64>>,
    /// Successful predictions by model
    predictions_by_model: RwLock<BTreeMap<String, u64>>,
    /// Request latencies (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    /// Start time for rate calculation
    start_time: Instant,
    started_at: DateTime<Utc>,
}

impl PipelineMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            requests_total: AtomicU64::new(0),
            predictions_ok: AtomicU64::new(0),
            failures_by_kind: RwLock::new(BTreeMap::new()),
            predictions_by_model: RwLock::new(BTreeMap::new()),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            start_time: Instant::now(),
            started_at: Utc::now(),
        }
    }

    /// Record a successful prediction
    pub fn record_prediction(&self, model: &str, processing_time: Duration) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        self.predictions_ok.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut by_model) = self.predictions_by_model.write() {
            *by_model.entry(model.to_string()).or_insert(0) += 1;
        }
        self.record_time(processing_time);
    }

    /// Record a failed request
    pub fn record_failure(&self, kind: &str, processing_time: Duration) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut by_kind) = self.failures_by_kind.write() {
            *by_kind.entry(kind.to_string()).or_insert(0) += 1;
        }
        self.record_time(processing_time);
    }

    fn record_time(&self, processing_time: Duration) {
        if let Ok(mut times) = self.processing_times.write() {
            times.push(processing_time.as_micros() as u64);
            // Keep only the most recent half once full
            if times.len() > MAX_SAMPLES {
                times.drain(0..MAX_SAMPLES / 2);
            }
        }
    }

    /// Get processing time statistics
    pub fn get_processing_stats(&self) -> ProcessingStats {
        let mut sorted = match self.processing_times.read() {
            Ok(times) if !times.is_empty() => times.clone(),
            _ => return ProcessingStats::default(),
        };
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();
        let percentile = |p: f64| sorted[((count as f64 * p) as usize).min(count - 1)];

        ProcessingStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: percentile(0.50),
            p95_us: percentile(0.95),
            p99_us: percentile(0.99),
            max_us: sorted[count - 1],
        }
    }

    /// Requests per second since startup
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.requests_total.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn get_failures_by_kind(&self) -> BTreeMap<String, u64> {
        self.failures_by_kind
            .read()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    pub fn get_predictions_by_model(&self) -> BTreeMap<String, u64> {
        self.predictions_by_model
            .read()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// Point-in-time view for the stats endpoint
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            started_at: self.started_at,
            uptime_secs: self.start_time.elapsed().as_secs(),
            requests_total: self.requests_total.load(Ordering::Relaxed),
            predictions_ok: self.predictions_ok.load(Ordering::Relaxed),
            throughput_rps: self.get_throughput(),
            failures_by_kind: self.get_failures_by_kind(),
            predictions_by_model: self.get_predictions_by_model(),
            latency: self.get_processing_stats(),
        }
    }

    /// Log summary statistics
    pub fn print_summary(&self) {
        let snapshot = self.snapshot();
        let failures = snapshot.requests_total - snapshot.predictions_ok;

        info!(
            requests = snapshot.requests_total,
            ok = snapshot.predictions_ok,
            failed = failures,
            throughput = format!("{:.2} req/s", snapshot.throughput_rps),
            mean_us = snapshot.latency.mean_us,
            p50_us = snapshot.latency.p50_us,
            p95_us = snapshot.latency.p95_us,
            p99_us = snapshot.latency.p99_us,
            "Prediction service summary"
        );
        for (model, count) in &snapshot.predictions_by_model {
            info!(model = %model, predictions = count, "Model usage");
        }
        for (kind, count) in &snapshot.failures_by_kind {
            info!(kind = %kind, failures = count, "Request failures");
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Processing time statistics
#[derive(Debug, Default, Clone, Serialize)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
    pub requests_total: u64,
    pub predictions_ok: u64,
    pub throughput_rps: f64,
    pub failures_by_kind: BTreeMap<String, u64>,
    pub predictions_by_model: BTreeMap<String, u64>,
    pub latency: ProcessingStats,
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
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs.max(1)));
        // First tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}
