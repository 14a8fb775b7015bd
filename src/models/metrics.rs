//! Measurement result data models

use crate::models::config::TestConfig;
use crate::types::{LatencyRating, SpeedRating};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Latency figures over the collected RTT samples
///
/// `jitter_ms` is the range of the samples (`max - min`). The population
/// standard deviation is carried separately as `std_dev_ms`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyStatistics {
    pub average_rtt_ms: f64,
    pub jitter_ms: f64,
    pub min_rtt_ms: f64,
    pub max_rtt_ms: f64,
    pub std_dev_ms: f64,
    /// Successful RTTs in collection order
    pub samples_ms: Vec<f64>,
    /// Probes attempted, including failed ones
    pub attempted: u32,
    /// Probes that produced no sample
    pub failed: u32,
}

impl LatencyStatistics {
    /// Statistics over no samples at all
    pub fn empty() -> Self {
        crate::stats::latency_statistics(&[], 0)
    }

    pub fn sample_count(&self) -> usize {
        self.samples_ms.len()
    }

    pub fn rating(&self) -> LatencyRating {
        LatencyRating::from_ms(self.average_rtt_ms)
    }
}

/// Live latency figures published after every probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencySnapshot {
    pub running_average_ms: f64,
    pub running_jitter_ms: f64,
    pub sample_count: usize,
}

impl From<&LatencyStatistics> for LatencySnapshot {
    fn from(stats: &LatencyStatistics) -> Self {
        Self {
            running_average_ms: stats.average_rtt_ms,
            running_jitter_ms: stats.jitter_ms,
            sample_count: stats.samples_ms.len(),
        }
    }
}

/// Result of one throughput phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThroughputResult {
    pub megabits_per_second: f64,
    /// Instantaneous speeds (progressive) or per-chunk speeds, in order
    pub samples_mbps: Vec<f64>,
    /// The figure is a fallback constant, not a measurement
    pub degraded: bool,
    pub bytes_transferred: u64,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
}

impl ThroughputResult {
    pub fn measured(megabits_per_second: f64, samples_mbps: Vec<f64>, bytes_transferred: u64, elapsed: Duration) -> Self {
        Self {
            megabits_per_second,
            samples_mbps,
            degraded: false,
            bytes_transferred,
            elapsed,
        }
    }

    /// Substitute result after a transport failure
    pub fn fallback(megabits_per_second: f64) -> Self {
        Self {
            megabits_per_second,
            samples_mbps: Vec::new(),
            degraded: true,
            bytes_transferred: 0,
            elapsed: Duration::ZERO,
        }
    }

    pub fn rating(&self) -> SpeedRating {
        SpeedRating::from_mbps(self.megabits_per_second)
    }
}

/// Final output of a completed session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub session_id: Uuid,
    pub latency: LatencyStatistics,
    pub download: ThroughputResult,
    pub upload: ThroughputResult,
    pub config: TestConfig,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl TestResult {
    pub fn duration(&self) -> chrono::Duration {
        self.completed_at - self.started_at
    }

    /// True when any throughput figure is a fallback constant
    pub fn is_degraded(&self) -> bool {
        self.download.degraded || self.upload.degraded
    }
}

/// Whatever finished before a session was cancelled
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialResult {
    pub session_id: Option<Uuid>,
    pub latency: Option<LatencyStatistics>,
    pub download: Option<ThroughputResult>,
    pub upload: Option<ThroughputResult>,
}

impl PartialResult {
    pub fn new(session_id: Uuid) -> Self {
        Self {
            session_id: Some(session_id),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.latency.is_none() && self.download.is_none() && self.upload.is_none()
    }
}

/// Metadata reported by the measurement server's `info` endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    #[serde(default)]
    pub server: ServerDetails,
    /// Server uptime in seconds
    #[serde(default)]
    pub uptime: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerDetails {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub arch: String,
}

impl ServerInfo {
    pub fn uptime_minutes(&self) -> f64 {
        self.uptime / 60.0
    }
}

/// Serialize durations as fractional milliseconds
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64() * 1000.0)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(millis.max(0.0) / 1000.0))
    }
}
