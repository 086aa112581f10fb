use super::{commands, dispatch};
use anyhow::{Context, Result};
use clap::ArgMatches;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Main orchestrator - Pure orchestration with no business logic
///
/// Five-step data flow:
/// 1. Parse: Extract CLI arguments
/// 2. Extract Verbosity: Convert flag count to logging level
/// 3. Initialize Telemetry: Set up structured logging to stderr
/// 4. Dispatch: Convert `ArgMatches` into typed Action enum
/// 5. Execute: Run the action's business logic
///
/// # Errors
///
/// Returns an error if any step in the flow fails
pub async fn start() -> Result<()> {
    // 1. Parse: Extract CLI arguments
    let matches = commands::new().get_matches();

    // 2. Extract Verbosity
    let verbosity = extract_verbosity(&matches);

    // 3. Initialize Telemetry
    init_tracing(verbosity)?;

    // 4. Dispatch: Convert ArgMatches into typed Action enum
    let action = dispatch::dispatch(&matches)?;
    debug!("dispatching {action:?}");

    // 5. Execute: Run the action's business logic
    action.execute().await?;

    Ok(())
}

fn extract_verbosity(matches: &ArgMatches) -> u8 {
    matches.get_count("verbose")
}

/// `RUST_LOG` wins when no `-v` is given
fn filter_for(verbosity: u8) -> EnvFilter {
    match verbosity {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    }
}

fn init_tracing(verbosity: u8) -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter_for(verbosity))
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    Ok(())
}
