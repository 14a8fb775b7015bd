//! Data models and structures for the speed probe

pub mod config;
pub mod metrics;

// Re-export main model types
pub use config::{Config, EngineSettings, ProgressiveSettings, TestConfig};
pub use metrics::{
    LatencySnapshot, LatencyStatistics, PartialResult, ServerDetails, ServerInfo, TestResult,
    ThroughputResult,
};
