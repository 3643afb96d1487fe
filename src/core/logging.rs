//! Logging initialization
//!
//! Library code logs through the `log` facade. The subscriber installed here
//! bridges those records into `tracing` (tower-http request spans land in the
//! same output) and writes them both to the console and to a log file.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize logger for both console and file output
///
/// # Arguments
/// * `level` - `EnvFilter` directive, e.g. `info` or `pmsbot=debug,tower_http=info`
/// * `log_file_path` - Path to the log file (appended to, parent created)
///
/// # Returns
/// * `Ok(())` - Logger initialized successfully
/// * `Err(anyhow::Error)` - Bad filter, unwritable file or logger already installed
pub fn init_logger(level: &str, log_file_path: &Path) -> Result<()> {
    if let Some(parent) = log_file_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
        }
    }

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file_path)
        .with_context(|| format!("Failed to open log file {}", log_file_path.display()))?;

    let filter = EnvFilter::try_new(level).with_context(|| format!("Invalid LOG_LEVEL '{}'", level))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(log_file)))
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logger: {}", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logger_rejects_bad_filter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("pmsbot.log");

        let result = init_logger("pmsbot=notalevel[", &path);

        assert!(result.is_err());
        // The file is created before the filter is parsed
        assert!(path.exists());
    }
}
