//! Service metrics and statistics tracking for the prediction pipeline.

use crate::types::{BankruptcyLabel, PredictionResult};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Metrics collector for the prediction service
pub struct PipelineMetrics {
    /// Requests received (single and batch)
    pub requests: AtomicU64,
    /// Records scored successfully
    pub predictions: AtomicU64,
    /// Records labelled bankrupt
    pub bankrupt: AtomicU64,
    /// Requests rejected, by error kind
    rejections: RwLock<BTreeMap<&'static str, u64>>,
    /// Request processing times (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    /// Probability distribution buckets
    probability_buckets: RwLock<[u64; 10]>,
    /// Start time for rate calculation
    start_time: Instant,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            requests: AtomicU64::new(0),
            predictions: AtomicU64::new(0),
            bankrupt: AtomicU64::new(0),
            rejections: RwLock::new(BTreeMap::new()),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            probability_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record a successfully served request and the predictions it produced
    pub fn record_success(&self, processing_time: Duration, results: &[PredictionResult]) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.predictions
            .fetch_add(results.len() as u64, Ordering::Relaxed);

        let bankrupt = results
            .iter()
            .filter(|r| r.label == BankruptcyLabel::Bankrupt)
            .count() as u64;
        self.bankrupt.fetch_add(bankrupt, Ordering::Relaxed);

        self.record_time(processing_time);

        if let Ok(mut buckets) = self.probability_buckets.write() {
            for result in results {
                let bucket = (result.probability * 10.0).clamp(0.0, 9.0) as usize;
                buckets[bucket] += 1;
            }
        }
    }

    /// Record a rejected request
    pub fn record_rejection(&self, processing_time: Duration, kind: &'static str) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.record_time(processing_time);

        if let Ok(mut rejections) = self.rejections.write() {
            *rejections.entry(kind).or_insert(0) += 1;
        }
    }

    fn record_time(&self, processing_time: Duration) {
        if let Ok(mut times) = self.processing_times.write() {
            times.push(processing_time.as_micros() as u64);
            // Keep only last 10000 for memory efficiency
            if times.len() > 10000 {
                times.drain(0..5000);
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
        let at = |q: f64| sorted[((count as f64 * q) as usize).min(count - 1)];

        ProcessingStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: at(0.5),
            p95_us: at(0.95),
            p99_us: at(0.99),
            max_us: sorted[count - 1],
        }
    }

    /// Get current throughput (requests per second)
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.requests.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn get_probability_distribution(&self) -> [u64; 10] {
        self.probability_buckets
            .read()
            .map(|b| *b)
            .unwrap_or_default()
    }

    pub fn get_rejections(&self) -> BTreeMap<&'static str, u64> {
        self.rejections
            .read()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Point-in-time view, served by the metrics endpoint
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.start_time.elapsed().as_secs(),
            requests: self.requests.load(Ordering::Relaxed),
            predictions: self.predictions.load(Ordering::Relaxed),
            bankrupt: self.bankrupt.load(Ordering::Relaxed),
            rejections: self
                .get_rejections()
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            throughput: self.get_throughput(),
            latency: self.get_processing_stats(),
            probability_distribution: self.get_probability_distribution(),
        }
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let snapshot = self.snapshot();
        let bankrupt_rate = if snapshot.predictions > 0 {
            (snapshot.bankrupt as f64 / snapshot.predictions as f64) * 100.0
        } else {
            0.0
        };
        let rejected: u64 = snapshot.rejections.values().sum();

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║         BANKRUPTCY PREDICTION SERVICE - METRICS SUMMARY      ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Requests:        {:>8}  │  Throughput: {:>8.1} req/s     ║",
            snapshot.requests, snapshot.throughput
        );
        info!(
            "║ Predictions:     {:>8}  │  Bankrupt:   {:>8.1}%          ║",
            snapshot.predictions, bankrupt_rate
        );
        info!("║ Rejected:        {:>8}                                    ║", rejected);
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Latency (μs): mean={:>5} p50={:>5} p95={:>5} p99={:>5}        ║",
            snapshot.latency.mean_us,
            snapshot.latency.p50_us,
            snapshot.latency.p95_us,
            snapshot.latency.p99_us
        );
        if !snapshot.rejections.is_empty() {
            info!("╠══════════════════════════════════════════════════════════════╣");
            info!("║ Rejections by Kind:                                          ║");
            for (kind, count) in &snapshot.rejections {
                info!("║   {:20}: {:>8}", kind, count);
            }
        }
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Probability Distribution:                                    ║");
        let total: u64 = snapshot.probability_distribution.iter().sum();
        for (i, &count) in snapshot.probability_distribution.iter().enumerate() {
            let pct = if total > 0 {
                (count as f64 / total as f64) * 100.0
            } else {
                0.0
            };
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
    pub uptime_secs: u64,
    pub requests: u64,
    pub predictions: u64,
    pub bankrupt: u64,
    pub rejections: BTreeMap<String, u64>,
    pub throughput: f64,
    pub latency: ProcessingStats,
    pub probability_distribution: [u64; 10],
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
        // The first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}
