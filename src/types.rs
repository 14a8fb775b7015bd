//! Type definitions shared between the engine and its consumers

use serde::{Deserialize, Serialize};
use std::fmt;

// Re-export commonly used types
pub use crate::error::{AppError, Result};

/// Measurement phase reported alongside every progress update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Priming the path before measuring
    Warmup,
    /// Round-trip latency sampling
    Latency,
    /// Download throughput
    Download,
    /// Upload throughput
    Upload,
}

impl Phase {
    /// Unit of the instantaneous value published during this phase
    pub fn unit(&self) -> &'static str {
        match self {
            Phase::Warmup => "MB",
            Phase::Latency => "ms",
            Phase::Download | Phase::Upload => "Mbps",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Warmup => "warmup",
            Phase::Latency => "latency",
            Phase::Download => "download",
            Phase::Upload => "upload",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of one measurement session
///
/// `Idle → Warming → Testing(Latency) → Testing(Download) → Testing(Upload) → Completed`,
/// with `Idle` reachable from anywhere on cancellation or orchestration failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "phase")]
pub enum SessionState {
    Idle,
    Warming,
    Testing(Phase),
    Completed,
}

impl SessionState {
    /// Check whether `next` is a legal successor of this state
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;

        match (self, next) {
            (_, Idle) => !matches!(self, Idle),
            (Idle, Warming) => true,
            (Idle, Testing(Phase::Latency)) => true,
            (Warming, Testing(Phase::Latency)) => true,
            (Testing(Phase::Latency), Testing(Phase::Download)) => true,
            (Testing(Phase::Download), Testing(Phase::Upload)) => true,
            (Testing(Phase::Upload), Completed) => true,
            _ => false,
        }
    }

    /// Completed and Idle end a session
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Idle | SessionState::Completed)
    }

    /// Phase being reported while in this state, if any
    pub fn phase(&self) -> Option<Phase> {
        match self {
            SessionState::Warming => Some(Phase::Warmup),
            SessionState::Testing(phase) => Some(*phase),
            SessionState::Idle | SessionState::Completed => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => f.write_str("idle"),
            SessionState::Warming => f.write_str("warming"),
            SessionState::Testing(phase) => write!(f, "testing:{}", phase),
            SessionState::Completed => f.write_str("completed"),
        }
    }
}

/// Coarse rating of a throughput figure, used for color coding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedRating {
    /// 100 Mbps and above
    Fast,
    /// 25-100 Mbps
    Moderate,
    /// 5-25 Mbps
    Slow,
    /// Below 5 Mbps
    Poor,
}

impl SpeedRating {
    pub fn from_mbps(mbps: f64) -> Self {
        if mbps >= 100.0 {
            Self::Fast
        } else if mbps >= 25.0 {
            Self::Moderate
        } else if mbps >= 5.0 {
            Self::Slow
        } else {
            Self::Poor
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Fast => "Fast",
            Self::Moderate => "Moderate",
            Self::Slow => "Slow",
            Self::Poor => "Poor",
        }
    }
}

/// Coarse rating of a round-trip time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatencyRating {
    /// Under 50 ms
    Excellent,
    /// 50-100 ms
    Good,
    /// 100-300 ms
    Fair,
    /// 300 ms and above
    Poor,
}

impl LatencyRating {
    pub fn from_ms(ms: f64) -> Self {
        if ms < 50.0 {
            Self::Excellent
        } else if ms < 100.0 {
            Self::Good
        } else if ms < 300.0 {
            Self::Fair
        } else {
            Self::Poor
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Excellent => "Excellent",
            Self::Good => "Good",
            Self::Fair => "Fair",
            Self::Poor => "Poor",
        }
    }
}
