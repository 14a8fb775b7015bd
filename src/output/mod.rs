//! Output formatting and display system
//!
//! Results, progress lines and server information render through the
//! [`OutputFormatter`] trait, with plain and colored implementations and a
//! JSON rendering for scripts.

mod colored;
mod formatter;

pub use self::colored::{latency_color, speed_color, ColorScheme, ColoredFormatter};
pub use formatter::{render_json, FormattingOptions, OutputFormatter, PlainFormatter};

use crate::{engine::SessionOutcome, error::Result};

/// Output formatting factory for creating appropriate formatters
pub struct OutputFormatterFactory;

impl OutputFormatterFactory {
    /// Create a formatter based on color support and preferences
    pub fn create_formatter(enable_color: bool, verbose: bool) -> Box<dyn OutputFormatter> {
        let options = FormattingOptions {
            enable_color,
            verbose_mode: verbose,
            ..FormattingOptions::default()
        };

        if enable_color {
            Box::new(ColoredFormatter::new(options))
        } else {
            Box::new(PlainFormatter::new(options))
        }
    }

    /// Create a plain text formatter for scripts/logs
    pub fn create_plain_formatter() -> Box<dyn OutputFormatter> {
        Self::create_formatter(false, true)
    }
}

/// Render a session outcome as text or JSON
pub fn render_outcome(formatter: &dyn OutputFormatter, outcome: &SessionOutcome, json: bool) -> Result<String> {
    match (outcome, json) {
        (SessionOutcome::Completed(result), true) => render_json(result),
        (SessionOutcome::Cancelled(partial), true) => render_json(partial),
        (SessionOutcome::Completed(result), false) => formatter.format_result(result),
        (SessionOutcome::Cancelled(partial), false) => formatter.format_partial(partial),
    }
}
