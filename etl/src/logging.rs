use std::fs;
use std::io;
use std::path::Path;
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Log file name inside the log directory (rotated daily).
pub const LOG_FILE: &str = "etl.log";

/// Directive used when `RUST_LOG` is not set.
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "campus_etl=debug"
    } else {
        "campus_etl=info"
    }
}

/// Builds the console (stderr) + JSON file subscriber.
///
/// When `log_dir` cannot be created the subscriber carries the console layer
/// only, and the directory error is returned in place of the file guard.
pub fn build_subscriber(
    log_dir: &Path,
    verbose: bool,
) -> (impl Subscriber + Send + Sync + 'static, io::Result<WorkerGuard>) {
    let (file_writer, guard) = match fs::create_dir_all(log_dir) {
        Ok(()) => {
            let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE);
            let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);
            (Some(non_blocking_writer), Ok(guard))
        }
        Err(e) => (None, Err(e)),
    };

    let file_layer = file_writer.map(|w| fmt::layer().json().with_writer(w));
    let console_layer = fmt::layer().with_target(false).with_writer(io::stderr);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer);
    (subscriber, guard)
}

/// Installs [`build_subscriber`] globally.
///
/// The returned guard flushes the file writer on drop; keep it alive for the
/// whole run. On error console logging is still installed.
pub fn init_logging(log_dir: &Path, verbose: bool) -> io::Result<WorkerGuard> {
    let (subscriber, guard) = build_subscriber(log_dir, verbose);

    // A second init (e.g. from tests) keeps the first subscriber.
    let _ = subscriber.try_init();

    guard
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive(false), "campus_etl=info");
        assert_eq!(default_directive(true), "campus_etl=debug");
    }

    #[test]
    fn test_init_creates_log_dir() {
        let dir = TempDir::new().unwrap();
        let log_dir = dir.path().join("nested").join("logs");

        let guard = init_logging(&log_dir, false).unwrap();

        assert!(log_dir.is_dir());
        drop(guard);
    }

    #[test]
    fn test_unusable_log_dir_keeps_console() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "x").unwrap();
        let log_dir = blocker.join("logs");

        let (subscriber, guard) = build_subscriber(&log_dir, true);

        assert!(guard.is_err());
        assert!(!log_dir.exists());
        tracing::subscriber::with_default(subscriber, || {
            assert!(tracing::enabled!(tracing::Level::INFO));
            tracing::info!("console only");
        });
    }
}
