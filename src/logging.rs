//! Tracing subscriber setup.
//!
//! Events go to stderr through an [`EnvFilter`] read from `PAGEFORGE_LOG`.
//! With `--log-file` a second, non-blocking layer appends plain-text events
//! to that file.

use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

pub const LOG_ENV: &str = "PAGEFORGE_LOG";

/// Filter directive: `PAGEFORGE_LOG` if set, else `debug` when verbose, else `warn`.
pub fn filter_directive(verbose: bool, env: impl Fn(&str) -> Option<String>) -> String {
    match env(LOG_ENV) {
        Some(directive) if !directive.trim().is_empty() => directive,
        _ if verbose => "debug".to_string(),
        _ => "warn".to_string(),
    }
}

/// Install the global subscriber. The returned guard must stay alive until
/// exit so buffered file output is flushed.
pub fn init_logging(verbose: bool, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let directive = filter_directive(verbose, |key| std::env::var(key).ok());
    let stderr_filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("warn"));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(stderr_filter);

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            let file_filter =
                EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("debug"));
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(file_filter);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directive_defaults() {
        assert_eq!(filter_directive(false, |_| None), "warn");
        assert_eq!(filter_directive(true, |_| None), "debug");
    }

    #[test]
    fn test_filter_directive_env_wins() {
        let env = |key: &str| (key == LOG_ENV).then(|| "pageforge=trace".to_string());
        assert_eq!(filter_directive(false, env), "pageforge=trace");
        assert_eq!(filter_directive(true, env), "pageforge=trace");
    }

    #[test]
    fn test_filter_directive_ignores_blank_env() {
        assert_eq!(filter_directive(true, |_| Some("  ".to_string())), "debug");
    }
}
