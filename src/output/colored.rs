//! Colored formatter with terminal color support

use super::formatter::{fmt_err, format_bytes, format_value, progress_bar, FormattingOptions, OutputFormatter};
use crate::{
    engine::ProgressUpdate,
    error::Result,
    models::{LatencyStatistics, PartialResult, ServerInfo, TestResult, ThroughputResult},
    types::{LatencyRating, Phase, SpeedRating},
};
use colored::*;
use std::fmt::Write as _;

/// Color for a latency rating
pub fn latency_color(rating: LatencyRating) -> Color {
    match rating {
        LatencyRating::Excellent => Color::Green,
        LatencyRating::Good => Color::Cyan,
        LatencyRating::Fair => Color::Yellow,
        LatencyRating::Poor => Color::Red,
    }
}

/// Color for a throughput rating
pub fn speed_color(rating: SpeedRating) -> Color {
    match rating {
        SpeedRating::Fast => Color::Green,
        SpeedRating::Moderate => Color::Cyan,
        SpeedRating::Slow => Color::Yellow,
        SpeedRating::Poor => Color::Red,
    }
}

/// Color scheme configuration
#[derive(Debug, Clone)]
pub struct ColorScheme {
    pub header: Color,
    pub success: Color,
    pub warning: Color,
    pub error: Color,
    pub info: Color,
    pub muted: Color,
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self {
            header: Color::Blue,
            success: Color::Green,
            warning: Color::Yellow,
            error: Color::Red,
            info: Color::Cyan,
            muted: Color::BrightBlack,
        }
    }
}

/// Colored formatter implementation
pub struct ColoredFormatter {
    options: FormattingOptions,
    color_scheme: ColorScheme,
}

impl ColoredFormatter {
    pub fn new(options: FormattingOptions) -> Self {
        Self {
            options,
            color_scheme: ColorScheme::default(),
        }
    }

    pub fn with_color_scheme(options: FormattingOptions, color_scheme: ColorScheme) -> Self {
        Self { options, color_scheme }
    }

    /// Apply color to text if colors are enabled
    fn colorize(&self, text: &str, color: Color) -> ColoredString {
        if self.options.enable_color {
            text.color(color)
        } else {
            text.normal()
        }
    }

    fn label(&self, text: &str) -> ColoredString {
        let padded = format!("{:<10}", text);
        if self.options.enable_color {
            padded.bold()
        } else {
            padded.normal()
        }
    }

    fn phase_color(&self, phase: Phase) -> Color {
        match phase {
            Phase::Warmup => self.color_scheme.muted,
            Phase::Latency => self.color_scheme.info,
            Phase::Download => Color::Green,
            Phase::Upload => Color::Magenta,
        }
    }

    fn write_latency(&self, out: &mut String, latency: &LatencyStatistics) -> Result<()> {
        let rating = latency.rating();
        let value = format!("{:.2} ms", latency.average_rtt_ms);
        writeln!(
            out,
            "{} {} {}",
            self.label("Latency:"),
            self.colorize(&value, latency_color(rating)),
            self.colorize(&format!("({})", rating.description()), self.color_scheme.muted)
        )
        .map_err(fmt_err)?;
        writeln!(out, "{} {:.2} ms", self.label("Jitter:"), latency.jitter_ms).map_err(fmt_err)?;

        if self.options.verbose_mode {
            let detail = format!(
                "min {:.2} / max {:.2} / std dev {:.2} ms, {} of {} probes answered",
                latency.min_rtt_ms,
                latency.max_rtt_ms,
                latency.std_dev_ms,
                latency.sample_count(),
                latency.attempted
            );
            writeln!(out, "{:<10} {}", "", self.colorize(&detail, self.color_scheme.muted)).map_err(fmt_err)?;
        }
        Ok(())
    }

    fn write_throughput(&self, out: &mut String, label: &str, result: &ThroughputResult) -> Result<()> {
        let rating = result.rating();
        let value = format!("{:.2} Mbps", result.megabits_per_second);
        write!(
            out,
            "{} {} {}",
            self.label(&format!("{}:", label)),
            self.colorize(&value, speed_color(rating)),
            self.colorize(&format!("({})", rating.description()), self.color_scheme.muted)
        )
        .map_err(fmt_err)?;
        if result.degraded {
            write!(out, " {}", self.colorize("(estimated)", self.color_scheme.warning)).map_err(fmt_err)?;
        }
        out.push('\n');

        if self.options.verbose_mode && !result.degraded {
            let detail = format!(
                "{} in {:.2}s, {} samples",
                format_bytes(result.bytes_transferred),
                result.elapsed.as_secs_f64(),
                result.samples_mbps.len()
            );
            writeln!(out, "{:<10} {}", "", self.colorize(&detail, self.color_scheme.muted)).map_err(fmt_err)?;
        }
        Ok(())
    }
}

impl OutputFormatter for ColoredFormatter {
    fn format_header(&self, title: &str) -> Result<String> {
        let mut output = String::new();
        let border = "═".repeat(title.chars().count() + 4);

        writeln!(output, "{}", self.colorize(&border, self.color_scheme.header)).map_err(fmt_err)?;
        writeln!(output, "  {}  ", self.colorize(title, self.color_scheme.header).bold()).map_err(fmt_err)?;
        write!(output, "{}", self.colorize(&border, self.color_scheme.header)).map_err(fmt_err)?;

        Ok(output)
    }

    fn format_result(&self, result: &TestResult) -> Result<String> {
        let mut output = self.format_header("Speed Test Results")?;
        output.push('\n');

        self.write_latency(&mut output, &result.latency)?;
        self.write_throughput(&mut output, "Download", &result.download)?;
        self.write_throughput(&mut output, "Upload", &result.upload)?;

        let duration = format!(
            "{:.1}s with {} connection(s)",
            result.duration().num_milliseconds() as f64 / 1000.0,
            result.config.connection_count
        );
        writeln!(output, "{} {}", self.label("Duration:"), self.colorize(&duration, self.color_scheme.muted))
            .map_err(fmt_err)?;

        if result.is_degraded() {
            writeln!(
                output,
                "{}",
                self.colorize(
                    "⚠ some figures are estimates because the server did not respond",
                    self.color_scheme.warning
                )
            )
            .map_err(fmt_err)?;
        }

        Ok(output)
    }

    fn format_partial(&self, partial: &PartialResult) -> Result<String> {
        let mut output = self.format_header("Speed Test Cancelled")?;
        output.push('\n');

        if partial.is_empty() {
            writeln!(output, "{}", self.colorize("No measurements were completed", self.color_scheme.muted))
                .map_err(fmt_err)?;
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
        let color = self.phase_color(update.phase);
        format!(
            "{} [{}] {:>3.0}%  {}",
            self.colorize(&format!("{:<9}", update.phase.as_str()), color),
            self.colorize(&progress_bar(update.progress_percent, self.options.bar_width), color),
            update.progress_percent,
            format_value(update.phase, update.instantaneous_value)
        )
    }

    fn format_server_info(&self, info: &ServerInfo) -> Result<String> {
        let mut output = self.format_header("Server Information")?;
        output.push('\n');

        writeln!(output, "{} {}", self.label("Name:"), self.colorize(&info.server.name, self.color_scheme.info))
            .map_err(fmt_err)?;
        writeln!(output, "{} {}", self.label("Host:"), info.server.host).map_err(fmt_err)?;
        writeln!(output, "{} {} ({})", self.label("Platform:"), info.server.platform, info.server.arch)
            .map_err(fmt_err)?;
        writeln!(output, "{} {:.0} minutes", self.label("Uptime:"), info.uptime_minutes()).map_err(fmt_err)?;

        Ok(output)
    }

    fn format_error(&self, error: &str) -> Result<String> {
        Ok(format!("{} {}", self.colorize("✗ Error:", self.color_scheme.error).bold(), error))
    }

    fn format_warning(&self, warning: &str) -> Result<String> {
        Ok(format!("{} {}", self.colorize("⚠ Warning:", self.color_scheme.warning).bold(), warning))
    }

    fn format_success(&self, message: &str) -> Result<String> {
        Ok(format!("{} {}", self.colorize("✓", self.color_scheme.success).bold(), message))
    }
}
