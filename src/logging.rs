use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,hyper=warn,reqwest=warn";
const LOG_FILTER_ENV: &str = "AGENTDECK_LOG_FILTER";
const LOG_PATH_ENV: &str = "AGENTDECK_LOG_PATH";
const DEFAULT_LOG_PATH: &str = "/tmp/agentdeck.log";

/// Keeps the background log writer alive; drop it last.
pub struct LoggingHandle {
    pub log_path: Option<PathBuf>,
    _guard: WorkerGuard,
}

/// Installs the global subscriber. When stderr is a terminal the interactive
/// transcript owns it, so logs go to a file instead.
pub fn init_logging() -> anyhow::Result<LoggingHandle> {
    let filter = std::env::var(LOG_FILTER_ENV)
        .ok()
        .and_then(|value| EnvFilter::try_new(value).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER));

    let (writer, guard, log_path) = if std::io::stderr().is_terminal() {
        let log_path = log_path();
        let dir = log_path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        std::fs::create_dir_all(dir)?;
        let file_name = log_path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| "agentdeck.log".into());
        let appender = tracing_appender::rolling::never(dir, file_name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        (writer, guard, Some(log_path))
    } else {
        let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());
        (writer, guard, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true),
        )
        .try_init()?;

    tracing::debug!(
        component = "logging",
        log_path = ?log_path,
        filter = %std::env::var(LOG_FILTER_ENV)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or_else(|_| DEFAULT_FILTER.to_string()),
        "logging initialized"
    );

    Ok(LoggingHandle {
        log_path,
        _guard: guard,
    })
}

fn log_path() -> PathBuf {
    std::env::var(LOG_PATH_ENV)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_path_falls_back_to_default() {
        let _env_lock = crate::test_support::ENV_LOCK.blocking_lock();
        std::env::remove_var(LOG_PATH_ENV);
        assert_eq!(log_path(), PathBuf::from(DEFAULT_LOG_PATH));

        std::env::set_var(LOG_PATH_ENV, "  /var/tmp/deck.log ");
        assert_eq!(log_path(), PathBuf::from("/var/tmp/deck.log"));
        std::env::remove_var(LOG_PATH_ENV);
    }
}
