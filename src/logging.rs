//! Log sinks: console plus a daily-rolling file per bot.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Build the subscriber writing to stdout and to `<log_dir>/<file_prefix>.<date>`.
///
/// The returned guard flushes the file writer on drop and must outlive
/// the process's last log line.
pub fn subscriber(
    filter: EnvFilter,
    log_dir: &Path,
    file_prefix: &str,
) -> Result<(impl Subscriber + Send + Sync + 'static, WorkerGuard)> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    let file_appender = tracing_appender::rolling::daily(log_dir, file_prefix);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(file_writer),
        );

    Ok((subscriber, guard))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_reach_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("log");

        let (subscriber, guard) =
            subscriber(EnvFilter::new("info"), &log_dir, "001.log").unwrap();
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(price = 101, "New iteration");
            tracing::debug!("below the filter");
        });
        drop(guard);

        let files: Vec<_> = std::fs::read_dir(&log_dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        assert_eq!(files.len(), 1);
        assert!(files[0]
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("001.log"));

        let content = std::fs::read_to_string(&files[0]).unwrap();
        assert!(content.contains("New iteration"));
        assert!(content.contains("price=101"));
        assert!(!content.contains("below the filter"));
        assert!(!content.contains('\u{1b}'));
    }
}
