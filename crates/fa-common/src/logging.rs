//! Structured Logging Configuration
//!
//! JSON output for production (`LOG_FORMAT=json`), human-readable text
//! otherwise. `RUST_LOG` controls filtering and defaults to `info`.
//!
//! ```rust,ignore
//! fa_common::logging::init_logging("fa-trigger-processor");
//! tracing::info!(collection = "tasks", "Watcher started");
//! ```
//!
//! The one-shot CLI logs to stderr so that stdout carries only the report.

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Where log lines are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Stdout,
    Stderr,
}

/// Initialize logging for a long-running service (stdout).
pub fn init_logging(service_name: &str) {
    init_logging_to(service_name, LogTarget::Stdout);
}

/// Initialize logging with an explicit output target.
///
/// Reads LOG_FORMAT to pick JSON or text output and RUST_LOG for filtering.
pub fn init_logging_to(service_name: &str, target: LogTarget) {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    let env_filter = default_filter();

    if log_format.eq_ignore_ascii_case("json") {
        init_json_logging(env_filter, target);
    } else {
        init_text_logging(env_filter, target);
    }

    tracing::debug!(service = service_name, "Logging initialized");
}

fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// JSON logging for production / log aggregation.
fn init_json_logging(env_filter: EnvFilter, target: LogTarget) {
    let layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(false)
        .with_target(true)
        .flatten_event(true)
        .with_span_events(FmtSpan::CLOSE);

    match target {
        LogTarget::Stdout => tracing_subscriber::registry()
            .with(env_filter)
            .with(layer)
            .init(),
        LogTarget::Stderr => tracing_subscriber::registry()
            .with(env_filter)
            .with(layer.with_writer(std::io::stderr))
            .init(),
    }
}

/// Human-readable logging for development.
fn init_text_logging(env_filter: EnvFilter, target: LogTarget) {
    let layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match target {
        LogTarget::Stdout => tracing_subscriber::registry()
            .with(env_filter)
            .with(layer.with_ansi(true))
            .init(),
        LogTarget::Stderr => tracing_subscriber::registry()
            .with(env_filter)
            .with(layer.with_ansi(false).with_writer(std::io::stderr))
            .init(),
    }
}
