//! Configuration data model and validation

use crate::defaults;
use crate::types::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Options for one measurement session
///
/// Taken by value at session start and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestConfig {
    /// Parallel upload connections (1 selects the single-connection policy)
    #[serde(default = "default_connection_count")]
    pub connection_count: u32,

    /// Use the time-bounded adaptive stream instead of fixed-size downloads
    #[serde(default = "default_progressive_download")]
    pub progressive_download: bool,

    /// Prime the path before measuring
    #[serde(default = "default_warmup_enabled")]
    pub warmup_enabled: bool,

    /// Requested upload payload in MiB
    #[serde(default = "default_upload_size_mb")]
    pub upload_payload_size_mb: u32,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            connection_count: default_connection_count(),
            progressive_download: default_progressive_download(),
            warmup_enabled: default_warmup_enabled(),
            upload_payload_size_mb: default_upload_size_mb(),
        }
    }
}

impl TestConfig {
    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.connection_count == 0 {
            return Err(AppError::config("Connection count must be at least 1"));
        }

        if self.connection_count > defaults::MAX_CONNECTION_COUNT {
            return Err(AppError::config(format!(
                "Connection count cannot exceed {}",
                defaults::MAX_CONNECTION_COUNT
            )));
        }

        if !(defaults::MIN_UPLOAD_SIZE_MB..=defaults::MAX_UPLOAD_SIZE_MB)
            .contains(&self.upload_payload_size_mb)
        {
            return Err(AppError::config(format!(
                "Upload size must be between {} and {} MB, got {}",
                defaults::MIN_UPLOAD_SIZE_MB,
                defaults::MAX_UPLOAD_SIZE_MB,
                self.upload_payload_size_mb
            )));
        }

        Ok(())
    }

    pub fn is_multi_connection(&self) -> bool {
        self.connection_count > 1
    }

    /// Payload size actually sent per connection, after the per-policy cap
    pub fn effective_upload_size_mb(&self) -> u32 {
        let cap = if self.is_multi_connection() {
            defaults::MULTI_UPLOAD_CAP_MB
        } else {
            defaults::SINGLE_UPLOAD_CAP_MB
        };
        self.upload_payload_size_mb.min(cap)
    }
}

/// Parameters of the adaptive download stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressiveSettings {
    pub initial_mb: u32,
    pub max_mb: u32,
    pub duration_secs: u64,
    pub pattern: String,
}

impl Default for ProgressiveSettings {
    fn default() -> Self {
        Self {
            initial_mb: defaults::PROGRESSIVE_INITIAL_MB,
            max_mb: defaults::PROGRESSIVE_MAX_MB,
            duration_secs: defaults::PROGRESSIVE_DURATION_SECS,
            pattern: defaults::PROGRESSIVE_PATTERN.to_string(),
        }
    }
}

impl ProgressiveSettings {
    pub fn target_duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }
}

/// Engine tunables that stay fixed across sessions
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub ping_count: u32,
    pub ping_interval: Duration,
    pub settle_delay: Duration,
    pub progressive: ProgressiveSettings,
    pub download_sizes_mb: Vec<u32>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            ping_count: defaults::DEFAULT_PING_COUNT,
            ping_interval: defaults::DEFAULT_PING_INTERVAL,
            settle_delay: defaults::DEFAULT_SETTLE_DELAY,
            progressive: ProgressiveSettings::default(),
            download_sizes_mb: defaults::DOWNLOAD_SIZES_MB.to_vec(),
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the measurement server
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Session options
    #[serde(default)]
    pub test: TestConfig,

    /// Number of latency probes
    #[serde(default = "default_ping_count")]
    pub ping_count: u32,

    /// Delay between latency probes in milliseconds
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,

    /// Pause after warmup in milliseconds
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Sizes fetched by the multi-size download policy
    #[serde(default = "default_download_sizes_mb")]
    pub download_sizes_mb: Vec<u32>,

    /// Progressive stream parameters
    #[serde(default)]
    pub progressive: ProgressiveSettings,

    /// Whole-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_seconds: u64,

    /// TCP connect timeout
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_seconds: u64,

    /// Enable colored terminal output
    #[serde(default = "default_enable_color")]
    pub enable_color: bool,

    /// Emit the final result as JSON
    #[serde(default)]
    pub json_output: bool,

    /// Enable verbose output
    #[serde(default)]
    pub verbose: bool,

    /// Enable debug output
    #[serde(default)]
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            test: TestConfig::default(),
            ping_count: default_ping_count(),
            ping_interval_ms: default_ping_interval_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            download_sizes_mb: default_download_sizes_mb(),
            progressive: ProgressiveSettings::default(),
            timeout_seconds: default_timeout_secs(),
            connect_timeout_seconds: default_connect_timeout_secs(),
            enable_color: default_enable_color(),
            json_output: false,
            verbose: false,
            debug: false,
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Get timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    /// Tunables handed to the engine
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            ping_count: self.ping_count,
            ping_interval: Duration::from_millis(self.ping_interval_ms),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            progressive: self.progressive.clone(),
            download_sizes_mb: self.download_sizes_mb.clone(),
        }
    }

    /// Validate the configuration and return any errors
    pub fn validate(&self) -> Result<()> {
        if self.server_url.is_empty() {
            return Err(AppError::config("Server URL cannot be empty"));
        }

        match url::Url::parse(&self.server_url) {
            Ok(parsed) => {
                if parsed.scheme() != "http" && parsed.scheme() != "https" {
                    return Err(AppError::config(format!(
                        "Server URL must use http or https: {}",
                        self.server_url
                    )));
                }
            }
            Err(e) => {
                return Err(AppError::config(format!("Invalid server URL '{}': {}", self.server_url, e)));
            }
        }

        self.test.validate()?;

        if self.ping_count == 0 {
            return Err(AppError::config("Ping count must be greater than 0"));
        }

        if self.ping_count > 100 {
            return Err(AppError::config("Ping count cannot exceed 100"));
        }

        if self.ping_interval_ms > 10_000 {
            return Err(AppError::config("Ping interval cannot exceed 10000 ms"));
        }

        if self.download_sizes_mb.is_empty() {
            return Err(AppError::config("Download size list cannot be empty"));
        }

        if self.download_sizes_mb.iter().any(|&size| size == 0) {
            return Err(AppError::config("Download sizes must be greater than 0"));
        }

        if self.progressive.duration_secs == 0 {
            return Err(AppError::config("Progressive download duration must be greater than 0"));
        }

        if self.progressive.initial_mb > self.progressive.max_mb {
            return Err(AppError::config("Progressive initial size cannot exceed its maximum"));
        }

        if self.timeout_seconds == 0 {
            return Err(AppError::config("Timeout must be greater than 0"));
        }

        if self.timeout_seconds > 300 {
            return Err(AppError::config("Timeout cannot exceed 300 seconds"));
        }

        if self.connect_timeout_seconds == 0 {
            return Err(AppError::config("Connect timeout must be greater than 0"));
        }

        Ok(())
    }

    /// Merge environment variables into this configuration
    pub fn merge_from_env(&mut self) -> Result<()> {
        if let Ok(server_url) = std::env::var("SPEED_SERVER_URL") {
            let server_url = server_url.trim();
            if !server_url.is_empty() {
                self.server_url = server_url.to_string();
            }
        }

        if let Ok(connections) = std::env::var("CONNECTIONS") {
            self.test.connection_count = connections.trim().parse()
                .map_err(|e| AppError::config(format!("Invalid CONNECTIONS value '{}': {}", connections, e)))?;
        }

        if let Ok(progressive) = std::env::var("PROGRESSIVE_DOWNLOAD") {
            self.test.progressive_download = parse_env_bool("PROGRESSIVE_DOWNLOAD", &progressive)?;
        }

        if let Ok(warmup) = std::env::var("WARMUP") {
            self.test.warmup_enabled = parse_env_bool("WARMUP", &warmup)?;
        }

        if let Ok(upload_size) = std::env::var("UPLOAD_SIZE_MB") {
            self.test.upload_payload_size_mb = upload_size.trim().parse()
                .map_err(|e| AppError::config(format!("Invalid UPLOAD_SIZE_MB value '{}': {}", upload_size, e)))?;
        }

        if let Ok(ping_count) = std::env::var("PING_COUNT") {
            self.ping_count = ping_count.trim().parse()
                .map_err(|e| AppError::config(format!("Invalid PING_COUNT value '{}': {}", ping_count, e)))?;
        }

        if let Ok(interval) = std::env::var("PING_INTERVAL_MS") {
            self.ping_interval_ms = interval.trim().parse()
                .map_err(|e| AppError::config(format!("Invalid PING_INTERVAL_MS value '{}': {}", interval, e)))?;
        }

        if let Ok(timeout) = std::env::var("TIMEOUT_SECONDS") {
            self.timeout_seconds = timeout.trim().parse()
                .map_err(|e| AppError::config(format!("Invalid TIMEOUT_SECONDS value '{}': {}", timeout, e)))?;
        }

        if let Ok(enable_color) = std::env::var("ENABLE_COLOR") {
            self.enable_color = parse_env_bool("ENABLE_COLOR", &enable_color)?;
        }

        Ok(())
    }
}

/// Accepts true/false as well as 1/0, yes/no and on/off
pub(crate) fn parse_env_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(AppError::config(format!("Invalid {} value '{}': expected a boolean", name, other))),
    }
}

// Default value functions for serde
fn default_server_url() -> String {
    defaults::DEFAULT_SERVER_URL.to_string()
}

fn default_connection_count() -> u32 {
    defaults::DEFAULT_CONNECTION_COUNT
}

fn default_progressive_download() -> bool {
    defaults::DEFAULT_PROGRESSIVE_DOWNLOAD
}

fn default_warmup_enabled() -> bool {
    defaults::DEFAULT_WARMUP_ENABLED
}

fn default_upload_size_mb() -> u32 {
    defaults::DEFAULT_UPLOAD_SIZE_MB
}

fn default_ping_count() -> u32 {
    defaults::DEFAULT_PING_COUNT
}

fn default_ping_interval_ms() -> u64 {
    defaults::DEFAULT_PING_INTERVAL.as_millis() as u64
}

fn default_settle_delay_ms() -> u64 {
    defaults::DEFAULT_SETTLE_DELAY.as_millis() as u64
}

fn default_download_sizes_mb() -> Vec<u32> {
    defaults::DOWNLOAD_SIZES_MB.to_vec()
}

fn default_timeout_secs() -> u64 {
    defaults::DEFAULT_TIMEOUT.as_secs()
}

fn default_connect_timeout_secs() -> u64 {
    defaults::DEFAULT_CONNECT_TIMEOUT.as_secs()
}

fn default_enable_color() -> bool {
    defaults::DEFAULT_ENABLE_COLOR
}
