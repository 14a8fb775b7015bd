//! Speed Probe - command-line speed test
//!
//! Runs one measurement session against a speed-test server and prints the
//! result. Progress goes to stderr; `--json` puts the result alone on stdout.

use clap::Parser;
use speed_probe::{
    cli::Cli,
    config::{display_config_summary, load_config, EnvManager},
    engine::{SessionEvent, SessionOutcome, SpeedTestEngine},
    error::{AppError, Result},
    logging::LoggerFactory,
    models::Config,
    output::{render_outcome, OutputFormatter, OutputFormatterFactory},
    HttpTransport, SessionState, BUILD_TIME, GIT_COMMIT, PKG_NAME, VERSION,
};
use std::io::Write;
use std::process;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panic: {}", panic_info);
        process::exit(99);
    }));

    let cli = Cli::parse();
    let use_color = cli.use_colors();

    if let Err(e) = run_application(cli).await {
        eprintln!("{}", e.format_for_console(use_color));
        print_error_suggestions(&e);
        process::exit(e.exit_code());
    }
}

async fn run_application(cli: Cli) -> Result<()> {
    cli.validate().map_err(AppError::validation)?;

    if let Some(ref path) = cli.write_env_example {
        EnvManager::save_example_env_file(path)?;
        eprintln!("Example configuration written to {}", path.display());
        return Ok(());
    }

    if cli.debug {
        eprintln!(
            "{} v{} ({}, built {})",
            PKG_NAME,
            VERSION,
            GIT_COMMIT.unwrap_or("unknown commit"),
            BUILD_TIME
        );
        eprintln!("Debug mode enabled");
        for warning in EnvManager::validate_current_env() {
            eprintln!("{}", warning);
        }
        eprintln!();
    }

    let show_server_info = cli.server_info;
    let config = load_config(cli)?;

    if config.debug {
        eprintln!("Configuration loaded successfully:");
        eprintln!("{}", display_config_summary(&config));
        eprintln!();
    }

    let formatter = OutputFormatterFactory::create_formatter(config.enable_color, config.verbose);
    let transport = HttpTransport::new(&config)?;

    if show_server_info {
        let info = transport.fetch_server_info().await?;
        println!("{}", formatter.format_server_info(&info)?);
        return Ok(());
    }

    let loggers = LoggerFactory::new(config.clone());
    let engine = SpeedTestEngine::new(Arc::new(transport), config.engine_settings(), loggers);
    engine.prefill_payloads().await?;

    let outcome = run_session(&engine, &config, formatter.as_ref()).await?;
    println!("{}", render_outcome(formatter.as_ref(), &outcome, config.json_output)?);

    match outcome {
        SessionOutcome::Completed(_) => Ok(()),
        SessionOutcome::Cancelled(_) => Err(AppError::cancelled("Speed test interrupted")),
    }
}

/// Start a session, relay its events to stderr and wait for the outcome
async fn run_session(
    engine: &SpeedTestEngine,
    config: &Config,
    formatter: &dyn OutputFormatter,
) -> Result<SessionOutcome> {
    let mut handle = engine.start_session(config.test.clone())?;

    let token = handle.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    let show_progress = !config.json_output;
    let mut stderr = std::io::stderr();

    while let Some(event) = handle.next_event().await {
        match event {
            SessionEvent::Progress(update) if show_progress => {
                let _ = write!(stderr, "\r\x1b[2K{}", formatter.format_progress(&update));
                let _ = stderr.flush();
            }
            SessionEvent::StateChanged { state } => {
                if show_progress {
                    let _ = write!(stderr, "\r\x1b[2K");
                }
                if config.verbose && state != SessionState::Completed {
                    eprintln!("{}", formatter.format_success(&format!("entering {}", state))?);
                }
            }
            event if event.is_terminal() => {
                if show_progress {
                    let _ = writeln!(stderr);
                }
            }
            _ => {}
        }
    }

    handle.wait().await
}

/// Print the hints for an error under its console line
fn print_error_suggestions(error: &AppError) {
    let suggestions = error.suggestions();
    if suggestions.is_empty() {
        return;
    }

    eprintln!();
    eprintln!("Suggestions:");
    for suggestion in suggestions {
        eprintln!("  - {}", suggestion);
    }
}
