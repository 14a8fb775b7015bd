//! Environment variable handling and .env file management

use crate::error::{AppError, Result};
use crate::models::config::parse_env_bool;
use std::path::Path;

/// Environment variable configuration manager
pub struct EnvManager;

impl EnvManager {
    /// Load .env from the current directory if it exists
    pub fn load_env_file(debug: bool) -> Result<()> {
        Self::load_env_file_from(Path::new(".env"), debug)
    }

    /// Load a specific env file; a missing file is not an error
    pub fn load_env_file_from(path: &Path, debug: bool) -> Result<()> {
        if path.exists() {
            dotenv::from_path(path)
                .map_err(|e| AppError::config(format!("Failed to load .env file: {}", e)))?;

            if debug {
                eprintln!("Loaded configuration from {}", path.display());
            }
        } else if debug {
            eprintln!("No .env file found, using defaults and CLI arguments");
        }

        Ok(())
    }

    /// Create example .env file content
    pub fn create_example_env_content() -> String {
        format!(
            r#"# Speed Probe Configuration
#
# Values here act as defaults and can be overridden by real environment
# variables or command-line arguments.

# Base URL of the speed-test server API
# SPEED_SERVER_URL={server}

# Parallel connections for download and upload (1-4)
# CONNECTIONS={connections}

# Use the progressive download stream (true/false)
# PROGRESSIVE_DOWNLOAD=true

# Run the warmup phase before measuring (true/false)
# WARMUP=true

# Upload payload size in MB (1-10)
# UPLOAD_SIZE_MB={upload}

# Number of latency probes
# PING_COUNT={pings}

# Delay between latency probes in milliseconds
# PING_INTERVAL_MS={interval}

# Request timeout in seconds
# TIMEOUT_SECONDS={timeout}

# Enable colored output (true/false)
# ENABLE_COLOR=true

# Example: local server with parallel connections
# SPEED_SERVER_URL=http://localhost:3000/api
# CONNECTIONS=4
# PROGRESSIVE_DOWNLOAD=false
"#,
            server = crate::defaults::DEFAULT_SERVER_URL,
            connections = crate::defaults::DEFAULT_CONNECTION_COUNT,
            upload = crate::defaults::DEFAULT_UPLOAD_SIZE_MB,
            pings = crate::defaults::DEFAULT_PING_COUNT,
            interval = crate::defaults::DEFAULT_PING_INTERVAL.as_millis(),
            timeout = crate::defaults::DEFAULT_TIMEOUT.as_secs(),
        )
    }

    /// Save example .env file to disk
    pub fn save_example_env_file(path: &Path) -> Result<()> {
        let content = Self::create_example_env_content();
        std::fs::write(path, content)
            .map_err(|e| AppError::config(format!("Failed to write example .env file: {}", e)))?;

        Ok(())
    }

    /// Validate environment variable format before parsing
    pub fn validate_env_var(key: &str, value: &str) -> Result<()> {
        match key {
            "SPEED_SERVER_URL" => {
                let parsed = url::Url::parse(value.trim())
                    .map_err(|e| AppError::config(format!("Invalid SPEED_SERVER_URL '{}': {}", value, e)))?;
                if !matches!(parsed.scheme(), "http" | "https") {
                    return Err(AppError::config(format!("SPEED_SERVER_URL must use http or https: {}", value)));
                }
            }
            "CONNECTIONS" => {
                Self::check_range(key, value, 1, crate::defaults::MAX_CONNECTION_COUNT as u64)?;
            }
            "UPLOAD_SIZE_MB" => {
                Self::check_range(
                    key,
                    value,
                    crate::defaults::MIN_UPLOAD_SIZE_MB as u64,
                    crate::defaults::MAX_UPLOAD_SIZE_MB as u64,
                )?;
            }
            "PING_COUNT" => {
                Self::check_range(key, value, 1, 100)?;
            }
            "PING_INTERVAL_MS" => {
                Self::check_range(key, value, 0, 10_000)?;
            }
            "TIMEOUT_SECONDS" => {
                Self::check_range(key, value, 1, 300)?;
            }
            "PROGRESSIVE_DOWNLOAD" | "WARMUP" | "ENABLE_COLOR" => {
                parse_env_bool(key, value)?;
            }
            _ => {}
        }

        Ok(())
    }

    fn check_range(key: &str, value: &str, min: u64, max: u64) -> Result<()> {
        let parsed: u64 = value
            .trim()
            .parse()
            .map_err(|e| AppError::config(format!("Invalid {} value '{}': {}", key, value, e)))?;
        if parsed < min || parsed > max {
            return Err(AppError::config(format!(
                "{} must be between {} and {}, got: {}",
                key, min, max, parsed
            )));
        }
        Ok(())
    }

    /// Get list of all supported environment variables with descriptions
    pub fn get_supported_env_vars() -> Vec<(&'static str, &'static str, &'static str)> {
        vec![
            ("SPEED_SERVER_URL", "Base URL of the speed-test server API", "http://localhost:3000/api"),
            ("CONNECTIONS", "Parallel connections (1-4)", "4"),
            ("PROGRESSIVE_DOWNLOAD", "Use the progressive download stream", "true"),
            ("WARMUP", "Run the warmup phase", "true"),
            ("UPLOAD_SIZE_MB", "Upload payload size in MB (1-10)", "10"),
            ("PING_COUNT", "Number of latency probes (1-100)", "10"),
            ("PING_INTERVAL_MS", "Delay between latency probes in ms", "100"),
            ("TIMEOUT_SECONDS", "Request timeout in seconds (1-300)", "30"),
            ("ENABLE_COLOR", "Enable colored output", "true"),
        ]
    }

    /// Display environment variable help
    pub fn display_env_help() -> String {
        let mut help = String::new();
        help.push_str("Supported Environment Variables:\n\n");

        for (var, description, example) in Self::get_supported_env_vars() {
            help.push_str(&format!("  {:<22} {}\n", var, description));
            help.push_str(&format!("  {:<22} Example: {}\n\n", "", example));
        }

        help.push_str("Configuration Priority (highest to lowest):\n");
        help.push_str("  1. Command-line arguments\n");
        help.push_str("  2. Environment variables\n");
        help.push_str("  3. .env file values\n");
        help.push_str("  4. Default values\n");

        help
    }

    /// Validate all currently set environment variables
    pub fn validate_current_env() -> Vec<String> {
        Self::get_supported_env_vars()
            .into_iter()
            .filter_map(|(name, _, _)| {
                let value = std::env::var(name).ok()?;
                Self::validate_env_var(name, &value).err().map(|e| format!("Warning: {}", e))
            })
            .collect()
    }

    /// Validate every assignment in an env file, returning one warning per bad line
    pub fn check_env_file(path: &Path) -> Result<Option<Vec<String>>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::config(format!("Failed to read .env file: {}", e)))?;

        let mut warnings = Vec::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                if let Err(e) = Self::validate_env_var(key.trim(), value.trim()) {
                    warnings.push(format!("Line '{}': {}", line, e));
                }
            }
        }

        Ok(Some(warnings))
    }
}
