//! Core formatting traits and the plain text implementation

use crate::{
    engine::ProgressUpdate,
    error::{AppError, Result},
    models::{LatencyStatistics, PartialResult, ServerInfo, TestResult, ThroughputResult},
    types::Phase,
};
use serde::Serialize;
use std::fmt::Write as _;

/// Main trait for output formatting
pub trait OutputFormatter {
    /// Format a header section
    fn format_header(&self, title: &str) -> Result<String>;

    /// Format a completed session
    fn format_result(&self, result: &TestResult) -> Result<String>;

    /// Format whatever a cancelled session managed to measure
    fn format_partial(&self, partial: &PartialResult) -> Result<String>;

    /// One-line rendering of a live progress update
    fn format_progress(&self, update: &ProgressUpdate) -> String;

    /// Format the server's `/info` response
    fn format_server_info(&self, info: &ServerInfo) -> Result<String>;

    /// Format error messages
    fn format_error(&self, error: &str) -> Result<String>;

    /// Format warning messages
    fn format_warning(&self, warning: &str) -> Result<String>;

    /// Format success messages
    fn format_success(&self, message: &str) -> Result<String>;
}

/// Configuration options for formatting
#[derive(Debug, Clone)]
pub struct FormattingOptions {
    pub enable_color: bool,
    /// Include individual samples and transfer details
    pub verbose_mode: bool,
    /// Width of the progress bar in characters
    pub bar_width: usize,
}

impl Default for FormattingOptions {
    fn default() -> Self {
        Self {
            enable_color: true,
            verbose_mode: false,
            bar_width: 24,
        }
    }
}

/// Serialize any result to pretty JSON
pub fn render_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(AppError::from)
}

pub(crate) fn fmt_err(e: std::fmt::Error) -> AppError {
    AppError::io(format!("Failed to format output: {}", e))
}

/// Value with the phase's unit, e.g. `42.31 ms` or `93.10 Mbps`
pub(crate) fn format_value(phase: Phase, value: f64) -> String {
    format!("{:.2} {}", value, phase.unit())
}

pub(crate) fn progress_bar(percent: f64, width: usize) -> String {
    let filled = ((percent.clamp(0.0, 100.0) / 100.0) * width as f64).round() as usize;
    format!("{}{}", "#".repeat(filled), "-".repeat(width - filled.min(width)))
}

pub(crate) fn format_bytes(bytes: u64) -> String {
    let mb = bytes as f64 / crate::stats::BYTES_PER_MEGABYTE;
    if mb >= 1.0 {
        format!("{:.1} MB", mb)
    } else {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    }
}

/// Plain text formatter implementation
pub struct PlainFormatter {
    options: FormattingOptions,
}

impl PlainFormatter {
    pub fn new(options: FormattingOptions) -> Self {
        Self { options }
    }

    fn write_latency(&self, out: &mut String, latency: &LatencyStatistics) -> Result<()> {
        writeln!(out, "Latency:   {:.2} ms ({})", latency.average_rtt_ms, latency.rating().description())
            .map_err(fmt_err)?;
        writeln!(out, "Jitter:    {:.2} ms", latency.jitter_ms).map_err(fmt_err)?;

        if self.options.verbose_mode {
            writeln!(
                out,
                "           min {:.2} / max {:.2} / std dev {:.2} ms, {} of {} probes answered",
                latency.min_rtt_ms,
                latency.max_rtt_ms,
                latency.std_dev_ms,
                latency.sample_count(),
                latency.attempted
            )
            .map_err(fmt_err)?;
        }
        Ok(())
    }

    fn write_throughput(&self, out: &mut String, label: &str, result: &ThroughputResult) -> Result<()> {
        let suffix = if result.degraded { " (estimated)" } else { "" };
        writeln!(
            out,
            "{:<10} {:.2} Mbps ({}){}",
            format!("{}:", label),
            result.megabits_per_second,
            result.rating().description(),
            suffix
        )
        .map_err(fmt_err)?;

        if self.options.verbose_mode && !result.degraded {
            writeln!(
                out,
                "           {} in {:.2}s, {} samples",
                format_bytes(result.bytes_transferred),
                result.elapsed.as_secs_f64(),
                result.samples_mbps.len()
            )
            .map_err(fmt_err)?;
        }
        Ok(())
    }
}

impl OutputFormatter for PlainFormatter {
    fn format_header(&self, title: &str) -> Result<String> {
        let mut output = String::new();
        let border = "=".repeat(title.len() + 4);

        writeln!(output, "{}", border).map_err(fmt_err)?;
        writeln!(output, "  {}  ", title).map_err(fmt_err)?;
        write!(output, "{}", border).map_err(fmt_err)?;

        Ok(output)
    }

    fn format_result(&self, result: &TestResult) -> Result<String> {
        let mut output = self.format_header("Speed Test Results")?;
        output.push('\n');

        self.write_latency(&mut output, &result.latency)?;
        self.write_throughput(&mut output, "Download", &result.download)?;
        self.write_throughput(&mut output, "Upload", &result.upload)?;

        writeln!(
            output,
            "Duration:  {:.1}s with {} connection(s)",
            result.duration().num_milliseconds() as f64 / 1000.0,
            result.config.connection_count
        )
        .map_err(fmt_err)?;

        if result.is_degraded() {
            writeln!(output, "Note: some figures are estimates because the server did not respond")
                .map_err(fmt_err)?;
        }

        Ok(output)
    }

    fn format_partial(&self, partial: &PartialResult) -> Result<String> {
        let mut output = self.format_header("Speed Test Cancelled")?;
        output.push('\n');

        if partial.is_empty() {
            writeln!(output, "No measurements were completed").map_err(fmt_err)?;
            return Ok(output);
        }

        if let Some(ref latency) = partial.latency {
            self.write_latency(&mut output, latency)?;
        }
        if let Some(ref download) = partial.download {
            self.write_throughput(&mut output, "Download", download)?;
        }
        if let Some(ref upload) = partial.upload {
            self.write_throughput(&mut output, "Upload", upload)?;
        }
        Ok(output)
    }

    fn format_progress(&self, update: &ProgressUpdate) -> String {
        format!(
            "{:<9} [{}] {:>3.0}%  {}",
            update.phase.as_str(),
            progress_bar(update.progress_percent, self.options.bar_width),
            update.progress_percent,
            format_value(update.phase, update.instantaneous_value)
        )
    }

    fn format_server_info(&self, info: &ServerInfo) -> Result<String> {
        let mut output = self.format_header("Server Information")?;
        output.push('\n');

        writeln!(output, "Name:      {}", info.server.name).map_err(fmt_err)?;
        writeln!(output, "Host:      {}", info.server.host).map_err(fmt_err)?;
        writeln!(output, "Platform:  {} ({})", info.server.platform, info.server.arch).map_err(fmt_err)?;
        writeln!(output, "Uptime:    {:.0} minutes", info.uptime_minutes()).map_err(fmt_err)?;

        Ok(output)
    }

    fn format_error(&self, error: &str) -> Result<String> {
        Ok(format!("Error: {}", error))
    }

    fn format_warning(&self, warning: &str) -> Result<String> {
        Ok(format!("Warning: {}", warning))
    }

    fn format_success(&self, message: &str) -> Result<String> {
        Ok(format!("Success: {}", message))
    }
}
