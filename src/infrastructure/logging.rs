//! Structured logging using tracing.
//!
//! Writes to `<workspace>/logs/pomotrack.{date}.log` with daily rotation and
//! keeps 7 files. `RUST_LOG` overrides the default `pomotrack=info` filter.
//! Falls back to stderr when the file appender cannot be created.

use std::fs;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const DEFAULT_FILTER: &str = "pomotrack=info";

/// Installs the global subscriber. The returned guard flushes the file writer
/// on drop and must be held for the lifetime of the process. A second call is
/// a no-op.
pub fn init(logs_dir: &Path) -> Option<WorkerGuard> {
    let _ = fs::create_dir_all(logs_dir);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    match create_file_appender(logs_dir) {
        Ok(file_appender) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let installed = tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .with_writer(non_blocking)
                        .with_timer(fmt::time::UtcTime::rfc_3339())
                        .with_ansi(false),
                )
                .try_init();
            installed.ok().map(|_| guard)
        }
        Err(_) => {
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_timer(fmt::time::UtcTime::rfc_3339())
                        .with_ansi(true),
                )
                .try_init();
            None
        }
    }
}

fn create_file_appender(
    logs_dir: &Path,
) -> Result<RollingFileAppender, tracing_appender::rolling::InitError> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("pomotrack")
        .filename_suffix("log")
        .max_log_files(7)
        .build(logs_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_appender_is_created_in_logs_dir() {
        let dir = std::env::temp_dir().join(format!("pomotrack-logging-{}", std::process::id()));
        fs::create_dir_all(&dir).expect("create logs dir");

        assert!(create_file_appender(&dir).is_ok());

        let _ = fs::remove_dir_all(&dir);
    }
}
