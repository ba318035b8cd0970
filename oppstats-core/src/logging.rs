//! Logging for the metrics engine
//!
//! Events go to a daily-rotated file under the state directory
//! (`~/.local/state/oppstats/oppstats.<date>.log`). Nothing is printed to
//! the terminal so CLI output stays clean JSON.

use crate::config::{Config, LoggingConfig};
use crate::error::{Error, Result};
use std::path::Path;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Log file name prefix; rotated files are `oppstats.<date>.log`
const LOG_FILE_PREFIX: &str = "oppstats";

/// Install the global subscriber.
///
/// The level comes from `RUST_LOG` when set, else from `config.level`.
/// Keep the returned guard alive for the life of the process; dropping it
/// flushes buffered lines.
pub fn init(config: &LoggingConfig) -> Result<LoggingGuard> {
    let log_dir = Config::state_dir();
    let appender = file_appender(&log_dir, config.max_files)?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let file_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .init();

    tracing::info!(
        log_dir = %log_dir.display(),
        level = %config.level,
        max_files = config.max_files,
        "Metrics logging initialized"
    );

    Ok(LoggingGuard { _guard: guard })
}

/// Daily-rotated appender in `log_dir`, pruned to `max_files` files.
///
/// Creates the directory if needed. A `max_files` of 0 keeps one file.
pub fn file_appender(log_dir: &Path, max_files: usize) -> Result<RollingFileAppender> {
    std::fs::create_dir_all(log_dir)?;

    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .max_log_files(max_files.max(1))
        .build(log_dir)
        .map_err(|e| {
            Error::Config(format!(
                "cannot create log appender in {}: {e}",
                log_dir.display()
            ))
        })
}

/// Initialize logging for tests (logs to stdout)
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .with_span_events(FmtSpan::CLOSE)
        .try_init();
}

/// Keeps the background log writer running
pub struct LoggingGuard {
    _guard: tracing_appender::non_blocking::WorkerGuard,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn log_files(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_init_test_is_reentrant() {
        init_test();
        init_test();
        tracing::debug!("test logging installed");
    }

    #[test]
    fn test_file_appender_creates_dir_and_writes() {
        let temp = TempDir::new().unwrap();
        let log_dir = temp.path().join("state").join("oppstats");

        let mut appender = file_appender(&log_dir, 0).unwrap();
        appender.write_all(b"session recorded\n").unwrap();
        appender.flush().unwrap();

        let files = log_files(&log_dir);
        assert_eq!(files.len(), 1);
        assert!(files[0].starts_with("oppstats."));
        assert!(files[0].ends_with(".log"));

        let written = std::fs::read_to_string(log_dir.join(&files[0])).unwrap();
        assert_eq!(written, "session recorded\n");
    }

    #[test]
    fn test_file_appender_rejects_file_as_dir() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("not-a-dir");
        std::fs::write(&blocker, "x").unwrap();

        assert!(file_appender(&blocker, 3).is_err());
    }
}
