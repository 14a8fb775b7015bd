//! Structured logging system for the speed probe
//!
//! This module provides:
//! - Structured logging with levels and named components
//! - Session correlation so every entry of one measurement run can be grouped
//! - Probe and phase event logging for the measurement engine
//! - JSON structured output for integration with log aggregators
//!
//! Every entry is written to stderr; stdout is reserved for results.

use crate::error::{AppError, ProbeError};
use crate::models::Config;
use crate::types::Phase;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Log level enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    /// Debug level - detailed information for debugging
    Debug = 1,
    /// Info level - general application information
    Info = 2,
    /// Warning level - potentially harmful situations
    Warn = 3,
    /// Error level - error events but application can continue
    Error = 4,
}

impl LogLevel {
    /// Get log level name as string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }

    /// Get ANSI color code for console output
    pub fn color_code(&self) -> &'static str {
        match self {
            LogLevel::Debug => "\x1b[36m",
            LogLevel::Info => "\x1b[32m",
            LogLevel::Warn => "\x1b[33m",
            LogLevel::Error => "\x1b[31m",
        }
    }

    /// Reset ANSI color code
    pub fn reset_code() -> &'static str {
        "\x1b[0m"
    }
}

/// Log entry structure for structured logging
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Timestamp when log entry was created
    pub timestamp: DateTime<Utc>,
    /// Log level
    pub level: LogLevel,
    /// Log message
    pub message: String,
    /// Logger name/component
    pub logger: String,
    /// Session the entry belongs to
    pub session_id: Option<String>,
    /// Additional structured fields
    pub fields: HashMap<String, serde_json::Value>,
}

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogFormat {
    /// Human-readable console format
    Console,
    /// JSON format for structured logging
    Json,
}

/// Logger implementation with console and JSON output
#[derive(Debug, Clone)]
pub struct Logger {
    min_level: LogLevel,
    use_color: bool,
    format: LogFormat,
    name: String,
    session_id: Option<String>,
}

impl Logger {
    /// Create a logger with specific configuration
    pub fn with_config(name: String, config: &Config) -> Self {
        let min_level = if config.debug {
            LogLevel::Debug
        } else if config.verbose {
            LogLevel::Info
        } else {
            LogLevel::Warn
        };

        Self {
            min_level,
            use_color: config.enable_color,
            format: if config.debug { LogFormat::Json } else { LogFormat::Console },
            name,
            session_id: None,
        }
    }

    /// Logger whose entries carry a session id
    fn with_session(name: String, config: &Config, session_id: String) -> Self {
        Self {
            session_id: Some(session_id),
            ..Self::with_config(name, config)
        }
    }

    /// Create a log entry builder
    pub fn log(&self, level: LogLevel, message: &str) -> LogEntryBuilder<'_> {
        LogEntryBuilder::new(self, level, message.to_string())
    }

    pub fn debug(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Debug, message)
    }

    pub fn info(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Info, message)
    }

    pub fn warn(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Warn, message)
    }

    pub fn error(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Error, message)
    }

    async fn write_entry(&self, entry: LogEntry) {
        if entry.level < self.min_level {
            return;
        }

        let mut line = self.render(&entry);
        line.push('\n');
        let _ = tokio::io::stderr().write_all(line.as_bytes()).await;
    }

    fn render(&self, entry: &LogEntry) -> String {
        match self.format {
            LogFormat::Console => self.format_console(entry),
            LogFormat::Json => self.format_json(entry),
        }
    }

    fn format_console(&self, entry: &LogEntry) -> String {
        let timestamp = entry.timestamp.format("%Y-%m-%d %H:%M:%S%.3f");
        let level_str = entry.level.as_str();

        let formatted_level = if self.use_color {
            format!("{}{:>5}{}", entry.level.color_code(), level_str, LogLevel::reset_code())
        } else {
            format!("{:>5}", level_str)
        };

        let mut output = format!("{} {} [{}] {}", timestamp, formatted_level, entry.logger, entry.message);

        if let Some(session_id) = &entry.session_id {
            let short = session_id.get(..8).unwrap_or(session_id);
            output.push_str(&format!(" [{}]", short));
        }

        if !entry.fields.is_empty() {
            let mut fields_str: Vec<String> = entry.fields.iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            fields_str.sort();
            output.push_str(&format!(" {{{}}}", fields_str.join(", ")));
        }

        output
    }

    fn format_json(&self, entry: &LogEntry) -> String {
        match serde_json::to_string(entry) {
            Ok(json) => json,
            Err(_) => format!("{{\"error\": \"Failed to serialize log entry\", \"message\": {:?}}}", entry.message),
        }
    }
}

/// Builder pattern for creating log entries
pub struct LogEntryBuilder<'a> {
    logger: &'a Logger,
    entry: LogEntry,
}

impl<'a> LogEntryBuilder<'a> {
    fn new(logger: &'a Logger, level: LogLevel, message: String) -> Self {
        Self {
            logger,
            entry: LogEntry {
                timestamp: Utc::now(),
                level,
                message,
                logger: logger.name.clone(),
                session_id: logger.session_id.clone(),
                fields: HashMap::new(),
            },
        }
    }

    /// Add a structured field
    pub fn field<T: Serialize>(mut self, key: &str, value: T) -> Self {
        if let Ok(json_value) = serde_json::to_value(value) {
            self.entry.fields.insert(key.to_string(), json_value);
        }
        self
    }

    /// Tag the entry with the phase it belongs to
    pub fn phase(self, phase: Phase) -> Self {
        self.field("phase", phase.as_str())
    }

    /// Add error information
    pub fn error_info(self, error: &AppError) -> Self {
        self.field("error_category", error.category())
            .field("error_recoverable", error.is_recoverable())
            .field("error_exit_code", error.exit_code())
    }

    /// Finalize and write the log entry
    pub async fn log(self) {
        self.logger.write_entry(self.entry).await;
    }
}

/// Logger for measurement phases and individual probes
#[derive(Debug, Clone)]
pub struct ProbeLogger {
    logger: Logger,
}

impl ProbeLogger {
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }

    /// Underlying logger, for one-off entries
    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub async fn phase_started(&self, phase: Phase) {
        self.logger.info(&format!("Starting {} phase", phase))
            .phase(phase)
            .log()
            .await;
    }

    pub async fn phase_completed(&self, phase: Phase, value: f64, elapsed: Duration) {
        self.logger.info(&format!("Finished {} phase: {:.2} {}", phase, value, phase.unit()))
            .phase(phase)
            .field("value", value)
            .field("elapsed_ms", elapsed.as_secs_f64() * 1000.0)
            .log()
            .await;
    }

    /// A probe produced no sample
    pub async fn probe_failed(&self, phase: Phase, sequence: Option<u32>, error: &ProbeError) {
        let message = match sequence {
            Some(seq) => format!("{} probe {} failed: {}", phase, seq, error),
            None => format!("{} probe failed: {}", phase, error),
        };

        self.logger.warn(&message)
            .phase(phase)
            .field("sequence", sequence)
            .field("error", error.to_string())
            .log()
            .await;
    }

    /// A phase failed on the wire and its figure was replaced by a constant
    pub async fn fallback_substituted(&self, phase: Phase, fallback_mbps: f64, error: &ProbeError) {
        self.logger.warn(&format!("{} phase failed, reporting fallback {:.1} Mbps", phase, fallback_mbps))
            .phase(phase)
            .field("fallback_mbps", fallback_mbps)
            .field("degraded", true)
            .field("error", error.to_string())
            .log()
            .await;
    }

    /// Cancellation is not a failure, so it is logged at info
    pub async fn phase_cancelled(&self, phase: Phase) {
        self.logger.info(&format!("{} phase cancelled", phase))
            .phase(phase)
            .field("cancelled", true)
            .log()
            .await;
    }

    pub async fn request(&self, method: &str, url: &str, status: Option<u16>, elapsed: Duration) {
        let success = status.map_or(false, |code| (200..300).contains(&code));
        let level = if success { LogLevel::Debug } else { LogLevel::Warn };
        let message = format!(
            "{} {} -> {} in {:.1}ms",
            method,
            url,
            status.map_or("FAILED".to_string(), |c| c.to_string()),
            elapsed.as_secs_f64() * 1000.0
        );

        self.logger.log(level, &message)
            .field("method", method)
            .field("url", url)
            .field("status_code", status)
            .field("duration_ms", elapsed.as_secs_f64() * 1000.0)
            .log()
            .await;
    }
}

/// Logger factory bound to the process configuration
#[derive(Debug, Clone)]
pub struct LoggerFactory {
    config: Config,
}

impl LoggerFactory {
    /// Create a new logger factory
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Create a probe logger for one measurement session
    pub fn create_probe_logger(&self, session_id: &Uuid) -> ProbeLogger {
        ProbeLogger::new(Logger::with_session("PROBE".to_string(), &self.config, session_id.to_string()))
    }

    /// Create a logger for one measurement session
    pub fn create_session_logger(&self, session_id: &Uuid) -> Logger {
        Logger::with_session("SESSION".to_string(), &self.config, session_id.to_string())
    }
}
