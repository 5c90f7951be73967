//! Logging configuration and the binary's lifecycle events.

use std::env;
use std::path::Path;

use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

pub const LOG_LEVEL_VAR: &str = "TIMEGRID_LOG_LEVEL";
pub const LOG_FORMAT_VAR: &str = "TIMEGRID_LOG_FORMAT";
pub const LOG_TARGET_VAR: &str = "TIMEGRID_LOG_TARGET";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
            include_target: false,
        }
    }
}

impl LoggingConfig {
    /// Builds a config from a variable lookup. Unset, blank or unparsable
    /// values keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(level) = lookup(LOG_LEVEL_VAR) {
            let trimmed = level.trim();
            if !trimmed.is_empty() {
                config.level = trimmed.to_string();
            }
        }
        if let Some(format) = lookup(LOG_FORMAT_VAR).as_deref().and_then(parse_log_format) {
            config.format = format;
        }
        if let Some(include_target) = lookup(LOG_TARGET_VAR).as_deref().and_then(parse_bool) {
            config.include_target = include_target;
        }

        config
    }
}

#[derive(Debug, Error)]
pub enum LoggingInitError {
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(#[from] tracing::subscriber::SetGlobalDefaultError),
}

pub fn logging_config_from_env() -> LoggingConfig {
    LoggingConfig::from_lookup(|key| env::var(key).ok())
}

/// Installs the global subscriber. Batch logs go to stderr so they never mix
/// with data written to stdout.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingInitError> {
    let env_filter =
        EnvFilter::try_new(config.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(config.include_target)
        .with_writer(std::io::stderr)
        .with_ansi(matches!(config.format, LogFormat::Pretty));

    match config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.pretty().finish())?,
    }

    Ok(())
}

pub fn log_app_start(config: &LoggingConfig) {
    info!(
        component = "timegrid_batch",
        event = "app.start",
        log_level = %config.level,
        log_format = ?config.format,
        include_target = config.include_target
    );
}

pub fn log_inputs_selected(lab: &Path, periodic: &Path, aperiodic: &Path, quantiles: &Path) {
    info!(
        component = "timegrid_batch",
        event = "inputs.selected",
        lab = %lab.display(),
        periodic = %periodic.display(),
        aperiodic = %aperiodic.display(),
        quantiles = %quantiles.display()
    );
}

pub fn log_output_written(kind: &str, path: &Path, rows: Option<u64>) {
    match rows {
        Some(rows) => info!(
            component = "timegrid_batch",
            event = "output.written",
            kind,
            path = %path.display(),
            rows
        ),
        None => info!(
            component = "timegrid_batch",
            event = "output.written",
            kind,
            path = %path.display()
        ),
    }
}

fn parse_log_format(raw: &str) -> Option<LogFormat> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "json" => Some(LogFormat::Json),
        "pretty" => Some(LogFormat::Pretty),
        _ => None,
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
