//! Global options and the optional TOML configuration file.
//!
//! Command-line options win over the file, and the file wins over the
//! built-in defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use pos_logging::LogConfig;
use serde::{Deserialize, Serialize};

use crate::retry::ExponentialBackoff;

/// Config file used when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "~/.pos/cli.toml";

/// Where the PoseidonOS CLI server listens by default.
pub const DEFAULT_ADDRESS: &str = "127.0.0.1:18716";

/// Connection options given on the command line.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct ConnectionOptions {
    /// Path to the configuration file [default: ~/.pos/cli.toml].
    #[arg(long, env = "POS_CLI_CONFIG")]
    pub config: Option<String>,

    /// Control-plane address (host:port).
    #[arg(long, env = "POS_CLI_ADDR")]
    pub address: Option<String>,

    /// Seconds to wait for the control plane to answer.
    #[arg(long)]
    pub timeout_secs: Option<f64>,
}

impl ConnectionOptions {
    /// Resolve the config path, expanding `~` to the home directory.
    pub fn resolved_config_path(&self) -> PathBuf {
        expand_home(self.config.as_deref().unwrap_or(DEFAULT_CONFIG_PATH))
    }

    /// Whether the user named a config file.
    pub fn has_explicit_config(&self) -> bool {
        self.config.is_some()
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

/// Errors loading or checking the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration file.
///
/// ```toml
/// [control_plane]
/// address = "127.0.0.1:18716"
/// connect_timeout = 3.0
/// request_timeout = 30.0
///
/// [retry]
/// max_attempts = 3
///
/// [log]
/// level = "warn"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    pub control_plane: ControlPlaneConfig,
    pub retry: RetryConfig,
    pub log: LogConfig,
}

/// Where the control plane is and how long to wait for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControlPlaneConfig {
    pub address: String,
    #[serde(with = "secs")]
    pub connect_timeout: Duration,
    #[serde(with = "secs")]
    pub request_timeout: Duration,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            connect_timeout: Duration::from_secs(3),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Retry budget for read-only operations that were never sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    pub max_attempts: u32,
    #[serde(with = "secs")]
    pub init_wait: Duration,
    #[serde(with = "secs")]
    pub max_wait: Duration,
    #[serde(with = "secs")]
    pub total_time: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            init_wait: Duration::from_millis(200),
            max_wait: Duration::from_secs(2),
            total_time: Duration::from_secs(10),
        }
    }
}

impl RetryConfig {
    /// A single attempt, no waiting.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(self.init_wait, self.max_wait, self.total_time, self.max_attempts)
    }
}

impl CliConfig {
    /// Parse a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &text)
    }

    fn parse(path: &Path, text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load the file named by `options` (defaults when the default file is
    /// absent), apply the command-line overrides and validate.
    pub fn from_options(options: &ConnectionOptions) -> Result<Self, ConfigError> {
        let path = options.resolved_config_path();
        let mut config = match Self::load(&path) {
            Ok(config) => config,
            Err(ConfigError::Io { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound && !options.has_explicit_config() =>
            {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Self::default()
            }
            Err(e) => return Err(e),
        };
        config.apply_overrides(options)?;
        config.validate()?;
        Ok(config)
    }

    /// Command-line options override the file.
    pub fn apply_overrides(&mut self, options: &ConnectionOptions) -> Result<(), ConfigError> {
        if let Some(address) = &options.address {
            self.control_plane.address = address.clone();
        }
        if let Some(secs) = options.timeout_secs {
            self.control_plane.request_timeout = Duration::try_from_secs_f64(secs)
                .map_err(|e| ConfigError::Invalid(format!("--timeout-secs {}: {}", secs, e)))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let cp = &self.control_plane;
        if cp.address.trim().is_empty() || !cp.address.contains(':') {
            return Err(ConfigError::Invalid(format!(
                "control_plane.address {:?} is not host:port",
                cp.address
            )));
        }
        if cp.connect_timeout.is_zero() {
            return Err(ConfigError::Invalid("control_plane.connect_timeout must be positive".into()));
        }
        if cp.request_timeout.is_zero() {
            return Err(ConfigError::Invalid("control_plane.request_timeout must be positive".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".into()));
        }
        if self.retry.init_wait > self.retry.max_wait {
            return Err(ConfigError::Invalid(format!(
                "retry.init_wait {:.3}s exceeds retry.max_wait {:.3}s",
                self.retry.init_wait.as_secs_f64(),
                self.retry.max_wait.as_secs_f64()
            )));
        }
        Ok(())
    }
}

/// Durations as (fractional) seconds.
mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_file(name: &str, contents: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("pos-cli-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_defaults() {
        let config = CliConfig::default();
        assert_eq!(config.control_plane.address, "127.0.0.1:18716");
        assert_eq!(config.control_plane.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.control_plane.request_timeout, Duration::from_secs(30));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.log.level, "warn");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_file() {
        let text = r#"
            [control_plane]
            address = "10.0.0.5:18716"
            request_timeout = 2.5

            [log]
            level = "debug"
        "#;
        let config = CliConfig::parse(Path::new("cli.toml"), text).unwrap();
        assert_eq!(config.control_plane.address, "10.0.0.5:18716");
        assert_eq!(config.control_plane.request_timeout, Duration::from_millis(2500));
        assert_eq!(config.control_plane.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.retry, RetryConfig::default());
    }

    #[test]
    fn test_integer_seconds_accepted() {
        let text = "[control_plane]\nconnect_timeout = 5\n";
        let config = CliConfig::parse(Path::new("cli.toml"), text).unwrap();
        assert_eq!(config.control_plane.connect_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_malformed_file_rejected() {
        let err = CliConfig::parse(Path::new("cli.toml"), "[control_plane\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));

        let err = CliConfig::parse(Path::new("cli.toml"), "[control_plane]\nport = 1\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));

        let err = CliConfig::parse(Path::new("cli.toml"), "[retry]\ninit_wait = -1.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let options = ConnectionOptions {
            config: Some("/nonexistent/pos/cli.toml".into()),
            ..Default::default()
        };
        assert!(matches!(
            CliConfig::from_options(&options),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn test_file_then_overrides() {
        let path = scratch_file(
            "override.toml",
            "[control_plane]\naddress = \"10.1.1.1:18716\"\nrequest_timeout = 9.0\n",
        );
        let options = ConnectionOptions {
            config: Some(path.to_string_lossy().into_owned()),
            address: Some("10.2.2.2:18716".into()),
            timeout_secs: None,
        };
        let config = CliConfig::from_options(&options).unwrap();
        assert_eq!(config.control_plane.address, "10.2.2.2:18716");
        assert_eq!(config.control_plane.request_timeout, Duration::from_secs(9));

        let options = ConnectionOptions {
            timeout_secs: Some(0.5),
            ..options
        };
        let config = CliConfig::from_options(&options).unwrap();
        assert_eq!(config.control_plane.request_timeout, Duration::from_millis(500));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = CliConfig::default();
        config.control_plane.address = "localhost".into();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = CliConfig::default();
        config.control_plane.request_timeout = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = CliConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let text = "[retry]\ninit_wait = 1e19\nmax_wait = 1.0\ntotal_time = 1e19\n";
        let config = CliConfig::parse(Path::new("cli.toml"), text).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(msg)) if msg.contains("init_wait")));

        let mut config = CliConfig::default();
        let options = ConnectionOptions {
            timeout_secs: Some(-3.0),
            ..Default::default()
        };
        assert!(config.apply_overrides(&options).is_err());
    }

    #[test]
    fn test_resolved_config_path() {
        let options = ConnectionOptions {
            config: Some("/etc/pos/cli.toml".into()),
            ..Default::default()
        };
        assert_eq!(options.resolved_config_path(), PathBuf::from("/etc/pos/cli.toml"));
        assert!(options.has_explicit_config());

        let options = ConnectionOptions::default();
        assert!(!options.has_explicit_config());
        assert!(options.resolved_config_path().ends_with(".pos/cli.toml"));
    }
}
