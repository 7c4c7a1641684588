//! Tracing and logging setup.
//!
//! [`setup_tracing`] installs a single `tracing` subscriber writing to stdout.
//! It is called once, first thing in `main`, before the environment is loaded.
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `RUST_LOG` | Log filter (e.g. `info`, `linkding_launcher=trace`) | `info,linkding_launcher=debug` |
//!
//! The default filter keeps the launcher itself at debug level, which is
//! where the request logging layer reports. Dependencies stay at info.
//!
//! # Output Modes
//!
//! Without `pretty_logs`, output is plain text suitable for log aggregation:
//! ```text
//! 2026-10-16 12:00:01,234 - linkding_launcher::web::server - INFO - Starting server at 127.0.0.1:9090
//! ```
//!
//! With `pretty_logs`, output is colorized with span nesting:
//! ```text
//! 12:00:01.234 INFO   linkding_launcher::web::server: Starting server at 127.0.0.1:9090
//! ```

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

#[cfg(feature = "pretty_logs")]
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(not(feature = "pretty_logs"))]
mod production;

#[cfg(feature = "pretty_logs")]
mod pretty;

/// Filter used when `RUST_LOG` is absent or invalid.
pub const DEFAULT_LOG_FILTER: &str = "info,linkding_launcher=debug";

/// Installs the console subscriber.
///
/// # Panics
///
/// Panics if a global subscriber has already been installed.
pub fn setup_tracing() {
    let console_layer = setup_console_layer();
    Registry::default().with(console_layer).init();
    tracing::info!("Tracing initialized successfully [reporting to console]");
}

fn console_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

#[cfg(feature = "pretty_logs")]
fn setup_console_layer() -> Box<dyn Layer<Registry> + Send + Sync + 'static> {
    tracing_subscriber::fmt::layer()
        .with_span_events(FmtSpan::NEW)
        .event_format(pretty::PrettyConsoleLogFormat)
        .with_filter(console_filter())
        .boxed()
}

#[cfg(not(feature = "pretty_logs"))]
fn setup_console_layer() -> Box<dyn Layer<Registry> + Send + Sync + 'static> {
    tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .event_format(production::ProductionLogFormat)
        .with_filter(console_filter())
        .boxed()
}
