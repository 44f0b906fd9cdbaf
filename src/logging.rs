//! Structured logging setup
//!
//! Provides JSON-formatted and human-readable logging with optional file output.
//! Logs go to STDERR so that records written to STDOUT stay machine-readable.

use crate::config::LoggingConfig;
use anyhow::Result;
use std::fs::OpenOptions;
use std::sync::Arc;
use tracing::Subscriber;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initialize logging based on configuration.
///
/// `RUST_LOG` takes precedence over the configured level. When a file path is
/// set, the same events are appended to that file as a second layer.
///
/// # Errors
///
/// Returns an error if the level is not a valid filter directive, the log file
/// cannot be opened, or a global subscriber is already installed.
///
/// # Examples
///
/// ```no_run
/// use burrow_poller::config::LoggingConfig;
/// use burrow_poller::logging::init_logging;
///
/// let config = LoggingConfig {
///     level: "info".to_string(),
///     json_format: true,
///     file_path: None,
/// };
///
/// init_logging(&config).unwrap();
/// ```
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let env_filter = build_filter(&config.level)?;

    let file_layer = match &config.file_path {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(output_layer(config.json_format, Arc::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(output_layer(config.json_format, std::io::stderr))
        .with(file_layer)
        .try_init()?;

    Ok(())
}

fn build_filter(level: &str) -> Result<EnvFilter> {
    Ok(EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?)
}

fn output_layer<S, W>(json: bool, writer: W) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    if json {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(writer)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_ansi(false)
            .with_writer(writer)
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_config_default() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert!(!config.json_format);
        assert_eq!(config.file_path, None);
    }

    #[test]
    fn test_build_filter_accepts_directives() {
        assert!(build_filter("debug").is_ok());
        assert!(build_filter("burrow_poller=trace,reqwest=warn").is_ok());
    }

    #[test]
    fn test_init_logging_with_bad_file_path() {
        let config = LoggingConfig {
            level: "info".to_string(),
            json_format: false,
            file_path: Some("/nonexistent/dir/burrow.log".into()),
        };
        assert!(init_logging(&config).is_err());
    }

    #[test]
    fn test_init_logging_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("burrow.log");
        let config = LoggingConfig {
            level: "info".to_string(),
            json_format: true,
            file_path: Some(path.clone()),
        };

        // Another test may already own the global subscriber; the file is
        // opened before installation either way.
        let _ = init_logging(&config);
        assert!(path.exists());
    }
}
