//! Command-line interface

use clap::Parser;

/// Speed Probe - measure latency, jitter and throughput against a speed-test server
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "spt")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Base URL of the speed-test server API
    #[arg(long, value_name = "URL")]
    pub server: Option<String>,

    /// Parallel connections for download and upload (1-4)
    #[arg(short = 'c', long)]
    pub connections: Option<u32>,

    /// Use fixed-size downloads instead of the progressive stream
    #[arg(long)]
    pub no_progressive: bool,

    /// Skip the warmup phase
    #[arg(long)]
    pub no_warmup: bool,

    /// Upload payload size in MB (1-10)
    #[arg(long, value_name = "MB")]
    pub upload_size: Option<u32>,

    /// Number of latency probes
    #[arg(long, value_name = "COUNT")]
    pub pings: Option<u32>,

    /// Delay between latency probes in milliseconds
    #[arg(long, value_name = "MS")]
    pub ping_interval: Option<u64>,

    /// Request timeout in seconds
    #[arg(short, long, value_parser = parse_duration)]
    pub timeout: Option<u64>,

    /// Print the result as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Show server information and exit
    #[arg(long)]
    pub server_info: bool,

    /// Force colored output
    #[arg(long)]
    pub color: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Enable verbose output
    #[arg(long)]
    pub verbose: bool,

    /// Enable debug output
    #[arg(long)]
    pub debug: bool,

    /// Write an example .env file to the given path and exit
    #[arg(long, value_name = "PATH")]
    pub write_env_example: Option<std::path::PathBuf>,
}

impl Cli {
    /// Validate CLI arguments for conflicts
    pub fn validate(&self) -> Result<(), String> {
        if self.color && self.no_color {
            return Err("Cannot specify both --color and --no-color".to_string());
        }

        if self.json && self.server_info {
            return Err("--json cannot be combined with --server-info".to_string());
        }

        Ok(())
    }

    /// Check if colors should be enabled
    pub fn use_colors(&self) -> bool {
        if self.color {
            true
        } else if self.no_color {
            false
        } else {
            supports_color()
        }
    }

    /// Human-readable summary of the flags that were given
    pub fn get_config_summary(&self) -> String {
        let mut summary = String::new();

        summary.push_str("Configuration Summary:\n");
        if let Some(ref server) = self.server {
            summary.push_str(&format!("  Server: {}\n", server));
        }
        if let Some(connections) = self.connections {
            summary.push_str(&format!("  Connections: {}\n", connections));
        }
        summary.push_str(&format!("  Progressive download: {}\n", !self.no_progressive));
        summary.push_str(&format!("  Warmup: {}\n", !self.no_warmup));
        if let Some(size) = self.upload_size {
            summary.push_str(&format!("  Upload size: {} MB\n", size));
        }
        if let Some(timeout) = self.timeout {
            summary.push_str(&format!("  Timeout: {}s\n", timeout));
        }
        summary.push_str(&format!("  Colored output: {}\n", self.use_colors()));
        summary.push_str(&format!("  Verbose mode: {}\n", self.verbose));
        summary.push_str(&format!("  Debug mode: {}\n", self.debug));

        summary
    }
}

/// Parse duration from seconds string
fn parse_duration(s: &str) -> Result<u64, String> {
    if s.starts_with('+') || s.starts_with("0x") || s.starts_with("0X") {
        return Err(format!("Invalid duration: {}", s));
    }

    s.parse::<u64>()
        .map_err(|_| format!("Invalid duration: {}", s))
        .and_then(|secs| {
            if secs == 0 {
                Err("Duration must be greater than 0".to_string())
            } else if secs > 300 {
                Err("Duration cannot exceed 300 seconds".to_string())
            } else {
                Ok(secs)
            }
        })
}

/// Check if the terminal supports color output
pub fn supports_color() -> bool {
    if let Ok(term) = std::env::var("TERM") {
        if term == "dumb" {
            return false;
        }
    }

    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }

    if std::env::var("FORCE_COLOR").is_ok() {
        return true;
    }

    #[cfg(target_os = "windows")]
    {
        if std::env::var("ANSICON").is_ok() || std::env::var("ConEmuANSI").is_ok() {
            return true;
        }
    }

    #[cfg(unix)]
    {
        true
    }
    #[cfg(not(unix))]
    {
        false
    }
}
