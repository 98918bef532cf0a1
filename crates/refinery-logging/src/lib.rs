//! # refinery-logging
//!
//! Logging for the refinery iteration engine.
//!
//! ## Key Types
//!
//! - [`Logger`] - Structured engine event logging
//! - [`LogEvent`] - Engine event types
//! - [`LogFormat`] - Output formats (Pretty, JSON, Compact)
//!
//! Diagnostics from every crate go through `tracing`; [`init_tracing`]
//! installs the subscriber. Console output goes to stderr so stdout stays
//! free for command results.

mod events;

pub use events::{LogEvent, LogFormat, Logger};

use std::path::Path;
use tracing::Subscriber;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer};

/// Initialize tracing for the application.
///
/// When `log_file` is set, every record is also appended to it as JSON. The
/// returned guard flushes that file and must be held until exit.
pub fn init_tracing(level: &str, format: LogFormat, log_file: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let (file_writer, guard) = match log_file.and_then(file_appender) {
        Some((writer, guard)) => (Some(writer), Some(guard)),
        None => (None, None),
    };

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_writer(std::io::stderr)
                        .with_target(false),
                )
                .with(file_writer.map(json_file_layer))
                .init();
        }
        LogFormat::Pretty | LogFormat::Compact => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(false),
                )
                .with(file_writer.map(json_file_layer))
                .init();
        }
    }

    guard
}

fn file_appender(path: &Path) -> Option<(NonBlocking, WorkerGuard)> {
    let file_name = path.file_name()?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir).ok()?;

    let appender = tracing_appender::rolling::never(dir, file_name);
    Some(tracing_appender::non_blocking(appender))
}

fn json_file_layer<S>(writer: NonBlocking) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer().json().with_writer(writer).with_ansi(false)
}
