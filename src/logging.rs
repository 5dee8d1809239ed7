//! Tracing subscriber setup for the command-line binary
//!
//! Console output and an optional log file share one `EnvFilter`. The
//! configured level applies unless `RUST_LOG` is set.

use std::fs;
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Registry};

use crate::config::LoggingConfig;

/// Errors raised while installing the subscriber.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// The configured level is not a valid filter directive.
    #[error("Invalid log level '{level}': {source}")]
    InvalidLevel {
        /// Level as configured
        level: String,
        /// Parser error
        source: tracing_subscriber::filter::ParseError,
    },
    /// The log file path has no file name component.
    #[error("Log file path {0} does not name a file")]
    NoFileName(PathBuf),
    /// The log directory could not be created.
    #[error("Failed to prepare log directory {path}: {source}")]
    CreateDir {
        /// Directory that was being created
        path: PathBuf,
        /// IO error
        source: std::io::Error,
    },
    /// A global subscriber was already installed.
    #[error("Failed to install global tracing subscriber: {0}")]
    SetGlobal(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Keeps the non-blocking file writer flushing; drop it on exit.
#[derive(Debug)]
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

/// Install the global subscriber described by `config`.
///
/// # Errors
/// Returns `LoggingError` if the level does not parse, the log directory
/// cannot be created, or a subscriber is already installed
pub fn init(config: &LoggingConfig) -> Result<LoggingGuard, LoggingError> {
    let filter = build_env_filter(&config.level)?;

    let console_layer = config
        .console
        .then(|| fmt::layer().with_target(false).with_writer(std::io::stderr));

    let (file_layer, guard) = match &config.file {
        Some(path) => {
            let (writer, guard) = file_writer(path)?;
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let subscriber = Registry::default()
        .with(filter)
        .with(console_layer)
        .with(file_layer);
    tracing::subscriber::set_global_default(subscriber)?;

    tracing::debug!(
        level = %config.level,
        file = ?config.file,
        console = config.console,
        "Logging initialized"
    );
    Ok(LoggingGuard { _file: guard })
}

fn build_env_filter(level: &str) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(level).map_err(|source| LoggingError::InvalidLevel {
        level: level.to_string(),
        source,
    })
}

fn file_writer(
    path: &Path,
) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard), LoggingError> {
    let file_name = path
        .file_name()
        .ok_or_else(|| LoggingError::NoFileName(path.to_path_buf()))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(|source| LoggingError::CreateDir {
        path: dir.clone(),
        source,
    })?;

    let appender = tracing_appender::rolling::never(&dir, file_name);
    Ok(tracing_appender::non_blocking(appender))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_level_rejected() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        assert!(matches!(
            build_env_filter("housing_value=loud"),
            Err(LoggingError::InvalidLevel { .. })
        ));
        assert!(build_env_filter("info").is_ok());
    }

    #[test]
    fn test_file_writer_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("main.log");
        let (_writer, _guard) = file_writer(&path).unwrap();
        assert!(dir.path().join("logs").is_dir());
    }

    #[test]
    fn test_file_writer_needs_file_name() {
        assert!(matches!(
            file_writer(Path::new("/")),
            Err(LoggingError::NoFileName(_))
        ));
    }
}
