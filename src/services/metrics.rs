//! Request latency and hit-rate accounting.
//!
//! Percentiles use linear interpolation between the two closest ranks
//! (`rank = p / 100 * (n - 1)` over the sorted window), the same estimator numpy
//! uses by default. Latencies live in a fixed-capacity ring buffer, so percentiles
//! describe the most recent `window` requests while counters are cumulative.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct MetricsSummary {
    /// Percentage of feedback events whose clicked item was among the recommendations
    pub hit_rate_at_k: f64,
    pub p50_latency_ms: f64,
    pub p99_latency_ms: f64,
    pub avg_latency_ms: f64,
    pub total_requests: u64,
    pub coldstart_requests: u64,
    pub model_requests: u64,
    pub coldstart_percentage: f64,
}

#[derive(Default)]
struct MetricsWindow {
    latencies_ms: VecDeque<f64>,
    total_requests: u64,
    coldstart_requests: u64,
    model_requests: u64,
    hits: u64,
    feedback_total: u64,
}

/// Concurrent-safe metrics accumulator
pub struct MetricsTracker {
    window: Mutex<MetricsWindow>,
    capacity: usize,
}

impl MetricsTracker {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: Mutex::new(MetricsWindow {
                latencies_ms: VecDeque::with_capacity(capacity),
                ..MetricsWindow::default()
            }),
            capacity,
        }
    }

    pub fn record_request(&self, latency: Duration, used_coldstart: bool) {
        let latency_ms = latency.as_secs_f64() * 1000.0;
        let mut window = self.window.lock();

        if window.latencies_ms.len() == self.capacity {
            window.latencies_ms.pop_front();
        }
        window.latencies_ms.push_back(latency_ms);

        window.total_requests += 1;
        if used_coldstart {
            window.coldstart_requests += 1;
        } else {
            window.model_requests += 1;
        }
    }

    pub fn record_feedback(&self, hit: bool) {
        let mut window = self.window.lock();
        window.feedback_total += 1;
        if hit {
            window.hits += 1;
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        let (mut latencies, counters) = {
            let window = self.window.lock();
            (
                window.latencies_ms.iter().copied().collect::<Vec<f64>>(),
                (
                    window.total_requests,
                    window.coldstart_requests,
                    window.model_requests,
                    window.hits,
                    window.feedback_total,
                ),
            )
        };
        let (total_requests, coldstart_requests, model_requests, hits, feedback_total) = counters;

        // Sorting happens outside the lock
        latencies.sort_by(f64::total_cmp);

        let hit_rate = if feedback_total > 0 {
            hits as f64 / feedback_total as f64 * 100.0
        } else {
            0.0
        };
        let avg = if latencies.is_empty() {
            0.0
        } else {
            latencies.iter().sum::<f64>() / latencies.len() as f64
        };
        let coldstart_percentage = if total_requests > 0 {
            coldstart_requests as f64 / total_requests as f64 * 100.0
        } else {
            0.0
        };

        MetricsSummary {
            hit_rate_at_k: round2(hit_rate),
            p50_latency_ms: round2(percentile(&latencies, 50.0)),
            p99_latency_ms: round2(percentile(&latencies, 99.0)),
            avg_latency_ms: round2(avg),
            total_requests,
            coldstart_requests,
            model_requests,
            coldstart_percentage: round2(coldstart_percentage),
        }
    }

    pub fn reset(&self) {
        let mut window = self.window.lock();
        *window = MetricsWindow {
            latencies_ms: VecDeque::with_capacity(self.capacity),
            ..MetricsWindow::default()
        };
    }
}

/// Linear-interpolation percentile over an already sorted slice; 0 when empty
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = (p / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
            let lower = rank.floor() as usize;
            let upper = rank.ceil() as usize;
            let weight = rank - lower as f64;
            sorted[lower] + (sorted[upper] - sorted[lower]) * weight
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
