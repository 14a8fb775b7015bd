//! Speed Probe
//!
//! A network path speed tester that measures round-trip latency, jitter,
//! download and upload throughput against an HTTP measurement server, under
//! single- and multi-connection conditions.

pub mod cli;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod models;
pub mod output;
pub mod stats;
pub mod types;

// Re-export commonly used types
pub use client::{HttpTransport, ProbeTransport};
pub use engine::{SessionEvent, SessionHandle, SessionOutcome, SpeedTestEngine};
pub use error::{AppError, ProbeError, Result};
pub use models::{Config, LatencyStatistics, PartialResult, TestConfig, TestResult, ThroughputResult};
pub use output::{ColoredFormatter, OutputFormatter, OutputFormatterFactory, PlainFormatter};
pub use types::{Phase, SessionState};

/// Application version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const PKG_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Build metadata set by build.rs
pub const BUILD_TIME: &str = env!("BUILD_TIME");
pub const GIT_COMMIT: Option<&str> = option_env!("GIT_COMMIT");

/// Default configuration values
pub mod defaults {
    use std::time::Duration;

    pub const DEFAULT_SERVER_URL: &str = "https://speedserver.onrender.com/api";

    pub const DEFAULT_CONNECTION_COUNT: u32 = 1;
    pub const MAX_CONNECTION_COUNT: u32 = 4;
    pub const DEFAULT_PROGRESSIVE_DOWNLOAD: bool = true;
    pub const DEFAULT_WARMUP_ENABLED: bool = true;
    pub const DEFAULT_UPLOAD_SIZE_MB: u32 = 1;
    pub const MIN_UPLOAD_SIZE_MB: u32 = 1;
    pub const MAX_UPLOAD_SIZE_MB: u32 = 10;

    /// Per-request upload caps
    pub const SINGLE_UPLOAD_CAP_MB: u32 = 10;
    pub const MULTI_UPLOAD_CAP_MB: u32 = 5;

    pub const DEFAULT_PING_COUNT: u32 = 10;
    pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_millis(100);
    pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(300);

    /// Progressive download parameters
    pub const PROGRESSIVE_INITIAL_MB: u32 = 1;
    pub const PROGRESSIVE_MAX_MB: u32 = 10;
    pub const PROGRESSIVE_DURATION_SECS: u64 = 8;
    pub const PROGRESSIVE_PATTERN: &str = "random";

    pub const DOWNLOAD_SIZES_MB: &[u32] = &[2, 5];

    /// Substituted when a throughput phase fails on the wire
    pub const DOWNLOAD_FALLBACK_MBPS: f64 = 42.5;
    pub const UPLOAD_FALLBACK_MBPS: f64 = 28.5;

    /// Warmup progress reaches 100% at this many bytes
    pub const WARMUP_SATURATION_BYTES: u64 = 2 * 1024 * 1024;

    /// Payload sizes generated ahead of the upload phase
    pub const PREFILL_PAYLOAD_SIZES_MB: &[u32] = &[1, 2, 5, 10];

    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
    pub const DEFAULT_ENABLE_COLOR: bool = true;
}
