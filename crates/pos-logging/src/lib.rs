//! Logging setup shared by the PoseidonOS CLI crates.
//!
//! Console output always goes to stderr: stdout belongs to command
//! results, which scripts parse.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing_appender::rolling;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level filter (trace, debug, info, warn, error).
    #[serde(default = "default_level")]
    pub level: String,

    /// Directory for log files. If None, no file logging.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Prefix for log file names.
    #[serde(default = "default_prefix")]
    pub file_prefix: String,

    /// Log rotation: "hourly", "daily", "never".
    #[serde(default = "default_rotation")]
    pub rotation: String,

    /// Whether to output JSON format.
    #[serde(default)]
    pub json_format: bool,

    /// Whether to also log to the console (stderr).
    #[serde(default = "default_true")]
    pub console_output: bool,
}

fn default_level() -> String {
    "warn".into()
}

fn default_prefix() -> String {
    "poseidonos-cli".into()
}

fn default_rotation() -> String {
    "daily".into()
}

fn default_true() -> bool {
    true
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: default_level(),
            log_dir: None,
            file_prefix: default_prefix(),
            rotation: default_rotation(),
            json_format: false,
            console_output: true,
        }
    }
}

impl LogConfig {
    /// Same config with the level replaced, used by `--verbose`.
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    fn rotation(&self) -> rolling::Rotation {
        match self.rotation.as_str() {
            "hourly" => rolling::Rotation::HOURLY,
            "never" => rolling::Rotation::NEVER,
            _ => rolling::Rotation::DAILY,
        }
    }
}

/// Errors raised while installing the global subscriber.
#[derive(Debug, thiserror::Error)]
pub enum LogInitError {
    #[error("failed to create log file appender: {0}")]
    FileAppender(#[from] rolling::InitError),

    #[error("a global logger is already installed: {0}")]
    AlreadyInstalled(String),
}

/// Install the global subscriber. Call once at program startup.
///
/// The returned guard (present only with file logging) flushes the
/// non-blocking file writer on drop and must be held until exit.
pub fn init_logging(
    config: &LogConfig,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>, LogInitError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(env_filter);

    let console_layer: Option<Box<dyn tracing_subscriber::Layer<_> + Send + Sync>> =
        if config.console_output {
            if config.json_format {
                Some(Box::new(fmt::layer().json().with_writer(std::io::stderr)))
            } else {
                Some(Box::new(
                    fmt::layer().with_target(false).with_writer(std::io::stderr),
                ))
            }
        } else {
            None
        };

    let (file_layer, guard): (
        Option<Box<dyn tracing_subscriber::Layer<_> + Send + Sync>>,
        Option<tracing_appender::non_blocking::WorkerGuard>,
    ) = if let Some(ref log_dir) = config.log_dir {
        let file_appender = rolling::RollingFileAppender::builder()
            .rotation(config.rotation())
            .filename_prefix(&config.file_prefix)
            .filename_suffix("log")
            .build(log_dir)?;

        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let layer: Box<dyn tracing_subscriber::Layer<_> + Send + Sync> = if config.json_format {
            Box::new(fmt::layer().json().with_ansi(false).with_writer(non_blocking))
        } else {
            Box::new(fmt::layer().with_ansi(false).with_writer(non_blocking))
        };

        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    registry
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| LogInitError::AlreadyInstalled(e.to_string()))?;

    tracing::debug!(level = %config.level, log_dir = ?config.log_dir, "logging initialized");
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = LogConfig::default();
        assert_eq!(cfg.level, "warn");
        assert!(cfg.log_dir.is_none());
        assert!(cfg.console_output);
        assert!(!cfg.json_format);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let cfg: LogConfig = toml::from_str("level = \"debug\"\njson_format = true\n").unwrap();
        assert_eq!(cfg.level, "debug");
        assert!(cfg.json_format);
        assert_eq!(cfg.file_prefix, "poseidonos-cli");
        assert_eq!(cfg.rotation, "daily");
    }

    #[test]
    fn test_with_level() {
        let cfg = LogConfig::default().with_level("debug");
        assert_eq!(cfg.level, "debug");
    }

    #[test]
    fn test_unknown_rotation_falls_back_to_daily() {
        let mut cfg = LogConfig::default();
        cfg.rotation = "weekly".into();
        assert_eq!(cfg.rotation(), rolling::Rotation::DAILY);
        cfg.rotation = "never".into();
        assert_eq!(cfg.rotation(), rolling::Rotation::NEVER);
    }
}
