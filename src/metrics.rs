//! Request metrics and periodic reporting for the gateway.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

const LATENCY_WINDOW: usize = 10_000;

/// Metrics collector shared by all workers
pub struct GatewayMetrics {
    /// Prediction requests answered with 200
    pub predictions_served: AtomicU64,
    /// Records run through a model
    pub rows_predicted: AtomicU64,
    /// Requests answered with an error
    pub requests_rejected: AtomicU64,
    served_by_endpoint: RwLock<HashMap<String, u64>>,
    rejections_by_reason: RwLock<HashMap<String, u64>>,
    /// Request latencies (in microseconds)
    latencies: RwLock<Vec<u64>>,
    start_time: Instant,
}

impl GatewayMetrics {
    pub fn new() -> Self {
        Self {
            predictions_served: AtomicU64::new(0),
            rows_predicted: AtomicU64::new(0),
            requests_rejected: AtomicU64::new(0),
            served_by_endpoint: RwLock::new(HashMap::new()),
            rejections_by_reason: RwLock::new(HashMap::new()),
            latencies: RwLock::new(Vec::with_capacity(1000)),
            start_time: Instant::now(),
        }
    }

    /// Record a successful prediction request
    pub fn record_prediction(&self, endpoint: &str, latency: Duration, rows: usize) {
        self.predictions_served.fetch_add(1, Ordering::Relaxed);
        self.rows_predicted.fetch_add(rows as u64, Ordering::Relaxed);

        if let Ok(mut by_endpoint) = self.served_by_endpoint.write() {
            *by_endpoint.entry(endpoint.to_string()).or_insert(0) += 1;
        }

        if let Ok(mut times) = self.latencies.write() {
            times.push(latency.as_micros() as u64);
            if times.len() > LATENCY_WINDOW {
                times.drain(0..LATENCY_WINDOW / 2);
            }
        }
    }

    /// Record a request answered with an error
    pub fn record_rejection(&self, endpoint: &str, reason: &str) {
        self.requests_rejected.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut by_reason) = self.rejections_by_reason.write() {
            *by_reason.entry(format!("{endpoint}:{reason}")).or_insert(0) += 1;
        }
    }

    /// Latency percentiles over the retained window
    pub fn get_latency_stats(&self) -> LatencyStats {
        let mut sorted: Vec<u64> = match self.latencies.read() {
            Ok(times) if !times.is_empty() => times.clone(),
            _ => return LatencyStats::default(),
        };
        sorted.sort_unstable();

        let count = sorted.len();
        let sum: u64 = sorted.iter().sum();
        let at = |q: f64| sorted[((count as f64 * q) as usize).min(count - 1)];

        LatencyStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: at(0.50),
            p95_us: at(0.95),
            p99_us: at(0.99),
            max_us: sorted[count - 1],
        }
    }

    /// Served predictions per second since startup
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.predictions_served.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn get_served_by_endpoint(&self) -> HashMap<String, u64> {
        self.served_by_endpoint
            .read()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    pub fn get_rejections_by_reason(&self) -> HashMap<String, u64> {
        self.rejections_by_reason
            .read()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// Log summary statistics
    pub fn print_summary(&self) {
        let served = self.predictions_served.load(Ordering::Relaxed);
        let rows = self.rows_predicted.load(Ordering::Relaxed);
        let rejected = self.requests_rejected.load(Ordering::Relaxed);
        let latency = self.get_latency_stats();

        info!(
            served = served,
            rows = rows,
            rejected = rejected,
            throughput = format!("{:.2} req/s", self.get_throughput()),
            mean_us = latency.mean_us,
            p50_us = latency.p50_us,
            p95_us = latency.p95_us,
            p99_us = latency.p99_us,
            max_us = latency.max_us,
            "Gateway metrics summary"
        );

        for (endpoint, count) in self.get_served_by_endpoint() {
            info!(endpoint = %endpoint, served = count, "Endpoint traffic");
        }
        for (reason, count) in self.get_rejections_by_reason() {
            info!(reason = %reason, rejected = count, "Rejected requests");
        }
    }
}

impl Default for GatewayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Request latency statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LatencyStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Logs a metrics summary on a fixed interval
pub struct MetricsReporter {
    metrics: Arc<GatewayMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<GatewayMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs.max(1)));
        // first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}
