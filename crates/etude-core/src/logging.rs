//! Tracing subscriber setup.
//!
//! Call one of these once, before building the [`App`](crate::app::App).
//! The filter comes from `RUST_LOG` when set:
//!
//! ```bash
//! # Request spans, guard rejections and cookie decisions
//! RUST_LOG=etude_core=debug,tower_http=debug cargo run
//!
//! # Production
//! RUST_LOG=warn cargo run
//! ```
//!
//! Every dispatched request runs inside a `dispatch` span carrying `method`,
//! `path`, `request_id` and the final `status`.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn filter_or(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Human-readable logs at `info` unless `RUST_LOG` says otherwise.
///
/// # Panics
///
/// Panics if a global subscriber is already installed.
pub fn init_logging() {
    init_logging_with_level("info");
}

/// Like [`init_logging`] with a different default level.
///
/// # Panics
///
/// Panics if a global subscriber is already installed.
pub fn init_logging_with_level(level: &str) {
    tracing_subscriber::registry()
        .with(filter_or(level))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Multi-line output with thread ids and source lines, for development.
///
/// # Panics
///
/// Panics if a global subscriber is already installed.
pub fn init_logging_pretty() {
    tracing_subscriber::registry()
        .with(filter_or("info"))
        .with(
            tracing_subscriber::fmt::layer()
                .pretty()
                .with_line_number(true)
                .with_thread_ids(true)
                .with_target(true),
        )
        .init();
}

/// One JSON object per event, for log aggregation.
///
/// # Panics
///
/// Panics if a global subscriber is already installed.
pub fn init_logging_json() {
    tracing_subscriber::registry()
        .with(filter_or("info"))
        .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
        .init();
}

/// Install a test writer subscriber; repeated calls are ignored.
pub fn try_init_test_logging() {
    let _ = tracing_subscriber::registry()
        .with(filter_or("debug"))
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

/// Pick the subscriber for an environment: pretty in development, JSON in
/// production, plain otherwise.
///
/// # Panics
///
/// Panics if a global subscriber is already installed.
pub fn init_logging_for(environment: &str) {
    match environment {
        "development" => init_logging_pretty(),
        "production" => init_logging_json(),
        _ => init_logging(),
    }
}
