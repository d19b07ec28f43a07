//! Logging setup
//!
//! Human-readable logs go to stderr. With `--debug`, everything at debug level
//! and above is also written as JSON lines to a daily-rotated file.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

const LOG_FILE_PREFIX: &str = "invitabot.log";

#[derive(Debug, Clone)]
pub struct LogConfig {
    debug_mode: bool,
    log_dir: PathBuf,
    level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self {
            debug_mode: false,
            log_dir: PathBuf::from("logs"),
            level: "info".to_string(),
        }
    }

    pub fn with_debug_mode(mut self, debug: bool) -> Self {
        self.debug_mode = debug;
        self
    }

    pub fn with_log_dir(mut self, dir: PathBuf) -> Self {
        self.log_dir = dir;
        self
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// `RUST_LOG` wins over the configured level; debug mode floors it at debug.
    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let level = if self.debug_mode { "debug" } else { self.level.as_str() };
            EnvFilter::new(format!("warn,invitabot={level}"))
        })
    }
}

/// Install the global subscriber. The returned guard flushes the log file on
/// drop and must live until shutdown.
pub fn init_logging(config: LogConfig) -> Result<Option<WorkerGuard>> {
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(config.filter());

    if !config.debug_mode {
        tracing_subscriber::registry()
            .with(stderr_layer)
            .try_init()
            .context("logging already initialized")?;
        return Ok(None);
    }

    fs::create_dir_all(&config.log_dir)
        .with_context(|| format!("Failed to create log directory: {:?}", config.log_dir))?;
    let appender = tracing_appender::rolling::daily(&config.log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let file_layer = fmt::layer()
        .with_writer(writer)
        .json()
        .with_ansi(false)
        .with_filter(config.filter());

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("logging already initialized")?;

    tracing::debug!("Debug logging to {:?}", config.log_dir);
    Ok(Some(guard))
}

/// Path of today's log file inside `log_dir`.
pub fn get_log_path(log_dir: &Path) -> PathBuf {
    let date = chrono::Local::now().format("%Y-%m-%d");
    log_dir.join(format!("{LOG_FILE_PREFIX}.{date}"))
}

/// Remove rotated log files last modified more than `days` ago.
pub fn cleanup_old_logs(log_dir: &Path, days: u64) -> Result<usize> {
    if !log_dir.exists() {
        return Ok(0);
    }
    let cutoff = SystemTime::now()
        .checked_sub(Duration::from_secs(days.saturating_mul(86_400)))
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let mut removed = 0;
    for entry in fs::read_dir(log_dir)
        .with_context(|| format!("Failed to read log directory: {:?}", log_dir))?
    {
        let entry = entry?;
        if !entry.file_name().to_string_lossy().starts_with(LOG_FILE_PREFIX) {
            continue;
        }
        let modified = entry.metadata()?.modified()?;
        if modified < cutoff {
            fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Log files in `log_dir`, newest first, with their sizes in bytes.
pub fn list_logs(log_dir: &Path) -> Result<Vec<(PathBuf, u64)>> {
    if !log_dir.exists() {
        return Ok(Vec::new());
    }
    let mut logs = Vec::new();
    for entry in fs::read_dir(log_dir)? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with(LOG_FILE_PREFIX) {
            let meta = entry.metadata()?;
            logs.push((entry.path(), meta.len(), meta.modified()?));
        }
    }
    logs.sort_by(|a, b| b.2.cmp(&a.2));
    Ok(logs.into_iter().map(|(path, len, _)| (path, len)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    #[test]
    fn test_log_config_builder() {
        let config = LogConfig::new()
            .with_debug_mode(true)
            .with_log_dir(PathBuf::from("/tmp/invitabot-logs"))
            .with_level("warn");
        assert!(config.debug_mode);
        assert_eq!(config.log_dir, PathBuf::from("/tmp/invitabot-logs"));
        assert_eq!(config.level, "warn");
    }

    #[test]
    fn test_get_log_path() {
        let path = get_log_path(Path::new("logs"));
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("invitabot.log."));
        assert_eq!(path.parent(), Some(Path::new("logs")));
    }

    #[test]
    fn test_cleanup_old_logs() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("invitabot.log.2020-01-01");
        let fresh = dir.path().join("invitabot.log.2099-01-01");
        let unrelated = dir.path().join("notes.txt");
        for path in [&old, &fresh, &unrelated] {
            File::create(path).unwrap();
        }
        let long_ago = SystemTime::now() - Duration::from_secs(30 * 24 * 60 * 60);
        File::options()
            .write(true)
            .open(&old)
            .unwrap()
            .set_modified(long_ago)
            .unwrap();
        File::options()
            .write(true)
            .open(&unrelated)
            .unwrap()
            .set_modified(long_ago)
            .unwrap();

        assert_eq!(cleanup_old_logs(dir.path(), 7).unwrap(), 1);
        assert!(!old.exists());
        assert!(fresh.exists());
        assert!(unrelated.exists());
        assert_eq!(list_logs(dir.path()).unwrap().len(), 1);
    }

    #[test]
    fn test_cleanup_with_huge_retention_keeps_everything() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("invitabot.log.2020-01-01");
        File::create(&log).unwrap();
        assert_eq!(cleanup_old_logs(dir.path(), u64::MAX).unwrap(), 0);
        assert!(log.exists());
    }

    #[test]
    fn test_cleanup_missing_dir() {
        assert_eq!(cleanup_old_logs(Path::new("/nonexistent/logs"), 7).unwrap(), 0);
        assert!(list_logs(Path::new("/nonexistent/logs")).unwrap().is_empty());
    }
}
