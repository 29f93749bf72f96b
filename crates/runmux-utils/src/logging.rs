//! Logging infrastructure for runmux
//!
//! This module provides structured logging with per-run spans so that
//! interleaved output from parallel runs stays attributable. Lock and
//! workspace events carry their own targets (`runmux::lock`,
//! `runmux::workspace`); the helpers here cover run lifecycle events.

use tracing::{Level, error, info, span};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Initialize the tracing subscriber for structured logging.
///
/// Sets up tracing with either compact (default) or verbose format.
/// Verbose format additionally emits span close events, which include
/// the `run_id` field and total span duration for each run.
///
/// `RUST_LOG` takes precedence over the `verbose` flag when set.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            if verbose {
                EnvFilter::try_new("runmux=debug,info")
            } else {
                EnvFilter::try_new("runmux=info,warn")
            }
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if verbose {
        // Verbose format: structured with all fields
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_thread_names(false)
                    .with_line_number(false)
                    .with_file(false)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()?;
    } else {
        // Compact format: human-readable, minimal
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_thread_names(false)
                    .with_line_number(false)
                    .with_file(false)
                    .compact(),
            )
            .try_init()?;
    }

    Ok(())
}

/// Create a span for a single run's pipeline with structured fields.
///
/// Every event emitted while the span is entered (lock acquisition,
/// workspace creation, callback execution) inherits the `run_id` field.
pub fn run_span(run_id: &str) -> tracing::Span {
    span!(Level::INFO, "run_execution", run_id = %run_id)
}

/// Log run start with structured fields.
pub fn log_run_start(run_id: &str) {
    info!(run_id = %run_id, "Starting run execution");
}

/// Log run completion with outcome and duration.
pub fn log_run_complete(run_id: &str, success: bool, duration_ms: u128) {
    info!(
        run_id = %run_id,
        success = %success,
        duration_ms = %duration_ms,
        "Run execution completed"
    );
}

/// Log a run-level failure with context.
///
/// This covers pipeline failures (lock contention, workspace errors,
/// callback errors); the run's `RunResult` carries the same message.
pub fn log_run_error(run_id: &str, error: &str, duration_ms: u128) {
    error!(
        run_id = %run_id,
        duration_ms = %duration_ms,
        error = %error,
        "Run execution failed"
    );
}
