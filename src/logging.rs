//! Logging setup for imghost.
//!
//! Everything goes through `tracing`; this module only wires the subscriber.
//! `RUST_LOG`, when set, takes precedence over the configured level.

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::{HostError, Result};

/// Level for a configured name. Unknown names mean INFO.
fn level_from_name(name: &str) -> Level {
    name.trim().parse::<Level>().unwrap_or_else(|_| {
        if name.trim().eq_ignore_ascii_case("warning") {
            Level::WARN
        } else {
            Level::INFO
        }
    })
}

fn filter_for(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(level_from_name(level).into()))
}

fn open_log_file(path: &str) -> Result<fs::File> {
    if let Some(dir) = Path::new(path).parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)?;
        }
    }
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

/// Install the global subscriber: stdout, plus the log file unless
/// `config.file` is empty. The file is appended to across restarts.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = filter_for(&config.level);
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if config.file.trim().is_empty() {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
    } else {
        let file = Arc::new(open_log_file(&config.file)?);
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stdout.and(file))
                    .with_ansi(false)
                    .with_target(true),
            )
            .try_init()
    };

    installed.map_err(|e| HostError::Config(format!("logging: {e}")))
}

/// Console-only fallback, used when the log file cannot be opened.
pub fn init_console_only(level: &str) {
    let _ = tracing_subscriber::registry()
        .with(filter_for(level))
        .with(tracing_subscriber::fmt::layer().with_ansi(true))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_level_from_name() {
        assert_eq!(level_from_name("trace"), Level::TRACE);
        assert_eq!(level_from_name("DEBUG"), Level::DEBUG);
        assert_eq!(level_from_name(" error "), Level::ERROR);
        assert_eq!(level_from_name("warning"), Level::WARN);
        assert_eq!(level_from_name("verbose"), Level::INFO);
        assert_eq!(level_from_name(""), Level::INFO);
    }

    #[test]
    fn test_open_log_file_creates_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("logs").join("host.log");
        let path = path.to_string_lossy().into_owned();

        open_log_file(&path).unwrap();
        assert!(Path::new(&path).is_file());
        // reopening appends rather than failing
        open_log_file(&path).unwrap();
    }
}
