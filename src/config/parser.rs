//! Configuration parsing from CLI arguments and environment variables

use crate::{cli::Cli, config::env::EnvManager, error::Result, models::Config};

/// Configuration parser that combines CLI arguments with environment variables
pub struct ConfigParser {
    cli: Cli,
}

impl ConfigParser {
    /// Create a new configuration parser with CLI arguments
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Defaults, then .env, then the environment, then CLI flags; validated last
    pub fn parse(&self) -> Result<Config> {
        let mut config = Config::default();

        EnvManager::load_env_file(self.cli.debug)?;
        config.merge_from_env()?;
        self.apply_cli_overrides(&mut config);

        config.validate()?;
        Ok(config)
    }

    /// Apply CLI argument overrides to configuration
    pub fn apply_cli_overrides(&self, config: &mut Config) {
        let cli = &self.cli;

        if let Some(ref server) = cli.server {
            config.server_url = server.clone();
        }
        if let Some(connections) = cli.connections {
            config.test.connection_count = connections;
        }
        if cli.no_progressive {
            config.test.progressive_download = false;
        }
        if cli.no_warmup {
            config.test.warmup_enabled = false;
        }
        if let Some(size) = cli.upload_size {
            config.test.upload_payload_size_mb = size;
        }
        if let Some(pings) = cli.pings {
            config.ping_count = pings;
        }
        if let Some(interval) = cli.ping_interval {
            config.ping_interval_ms = interval;
        }
        if let Some(timeout) = cli.timeout {
            config.timeout_seconds = timeout;
        }

        if cli.color {
            config.enable_color = true;
        } else if cli.no_color || !crate::cli::supports_color() {
            config.enable_color = false;
        }

        // CLI-only switches
        config.json_output = cli.json;
        config.verbose = cli.verbose;
        config.debug = cli.debug;

        if config.debug {
            eprintln!("Applied CLI overrides to configuration");
            eprintln!(
                "Final config: server={}, connections={}, timeout={}s, enable_color={}",
                config.server_url, config.test.connection_count, config.timeout_seconds, config.enable_color
            );
        }
    }
}

/// Convenience function to load complete configuration from CLI arguments
pub fn load_config(cli: Cli) -> Result<Config> {
    ConfigParser::new(cli).parse()
}

/// Display configuration summary for debug purposes
pub fn display_config_summary(config: &Config) -> String {
    let mut summary = Vec::new();

    summary.push(format!("Server: {}", config.server_url));
    summary.push(format!("Connections: {}", config.test.connection_count));
    summary.push(format!(
        "Download mode: {}",
        if config.test.progressive_download { "progressive" } else { "multi-size" }
    ));
    summary.push(format!("Warmup: {}", config.test.warmup_enabled));
    summary.push(format!(
        "Upload size: {} MB (effective {} MB)",
        config.test.upload_payload_size_mb,
        config.test.effective_upload_size_mb()
    ));
    summary.push(format!("Latency probes: {} every {}ms", config.ping_count, config.ping_interval_ms));
    summary.push(format!("Timeout: {}s", config.timeout_seconds));
    summary.push(format!("Color Output: {}", config.enable_color));
    summary.push(format!("Verbose: {}", config.verbose));
    summary.push(format!("Debug: {}", config.debug));

    summary.join("\n")
}
