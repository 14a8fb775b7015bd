//! Estimators computed from raw latency and throughput samples
//!
//! Everything here is a pure function over an ordered sample sequence so the
//! engine can recompute live figures from scratch after every new sample.

use crate::models::metrics::LatencyStatistics;
use std::time::Duration;

/// Bytes per megabit-denominator used by every speed figure (binary megabytes)
pub const BYTES_PER_MEGABYTE: f64 = 1_048_576.0;

/// Throughput in megabits per second for `bytes` moved in `elapsed`.
///
/// Returns `None` when no time has elapsed; no speed is published at `t = 0`.
pub fn speed_mbps(bytes: u64, elapsed: Duration) -> Option<f64> {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return None;
    }
    Some((bytes as f64 * 8.0) / (secs * BYTES_PER_MEGABYTE))
}

/// Aggregate throughput of transfers that ran concurrently.
///
/// The byte counts are summed and divided by one wall-clock window; summing
/// the individual durations would overstate throughput.
pub fn aggregate_speed_mbps(reported_bytes: &[u64], wall_clock: Duration) -> Option<f64> {
    let total: u64 = reported_bytes.iter().sum();
    speed_mbps(total, wall_clock)
}

/// Arithmetic mean, 0 for an empty slice
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Range of the samples (`max - min`), 0 for an empty slice
pub fn range_jitter(values: &[f64]) -> f64 {
    match min_max(values) {
        Some((min, max)) => max - min,
        None => 0.0,
    }
}

/// Population standard deviation, 0 for fewer than two samples
pub fn population_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let avg = mean(values);
    let variance = values
        .iter()
        .map(|&x| {
            let diff = x - avg;
            diff * diff
        })
        .sum::<f64>()
        / values.len() as f64;
    variance.sqrt()
}

/// Minimum and maximum in a single pass
pub fn min_max(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for &value in values {
        if value < min {
            min = value;
        }
        if value > max {
            max = value;
        }
    }
    Some((min, max))
}

/// Build latency statistics over the given RTT samples (milliseconds)
pub fn latency_statistics(samples_ms: &[f64], attempted: u32) -> LatencyStatistics {
    let (min_ms, max_ms) = min_max(samples_ms).unwrap_or((0.0, 0.0));
    let successful = samples_ms.len() as u32;

    LatencyStatistics {
        average_rtt_ms: mean(samples_ms),
        jitter_ms: max_ms - min_ms,
        min_rtt_ms: min_ms,
        max_rtt_ms: max_ms,
        std_dev_ms: population_std_dev(samples_ms),
        samples_ms: samples_ms.to_vec(),
        attempted,
        failed: attempted.saturating_sub(successful),
    }
}

/// Running mean of a growing sequence without keeping the sequence
#[derive(Debug, Clone, Default)]
pub struct RunningMean {
    sum: f64,
    count: usize,
}

impl RunningMean {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value and return the mean so far
    pub fn push(&mut self, value: f64) -> f64 {
        self.sum += value;
        self.count += 1;
        self.value()
    }

    pub fn value(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }
}
