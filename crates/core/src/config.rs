use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ─── Config ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    // Server
    pub host: String,
    pub port: u16,

    // Logging
    pub log_level: String,
    pub log_format: LogFormat,
    pub logging_to_file: bool,
    pub log_dir: Option<String>,

    // Background ticker interval in seconds (0 = disabled)
    pub ticker_interval_secs: u64,

    // Per-request logging
    pub request_logger: RequestLoggerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3333,
            log_level: "info".to_string(),
            log_format: LogFormat::default(),
            logging_to_file: false,
            log_dir: None,
            ticker_interval_secs: 1,
            request_logger: RequestLoggerConfig::default(),
        }
    }
}

impl Config {
    /// Load config from a YAML file and validate it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Like [`load`](Self::load), but a missing file is `Ok(None)`. Parse
    /// and validation failures are still errors.
    pub fn load_optional(path: impl AsRef<Path>) -> Result<Option<Self>, ConfigError> {
        match Self::load(path) {
            Ok(config) => Ok(Some(config)),
            Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml_ng::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::Invalid("port must be non-zero".into()));
        }
        if self.request_logger.request_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "request-logger.request-timeout-secs must be positive when set".into(),
            ));
        }
        Ok(())
    }
}

// ─── Sub-configs ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Options for the request logger middleware.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", default)]
pub struct RequestLoggerConfig {
    /// Emit a "request started" line when the entry is created.
    pub write_start_line: bool,
    /// Attach `http_scheme` and `http_proto` to the entry.
    pub protocol_fields: bool,
    /// Abandon the downstream handler after this many seconds.
    pub request_timeout_secs: Option<u64>,
    /// Print downstream panics to stderr as they pass through.
    pub print_panics: bool,
}

impl Default for RequestLoggerConfig {
    fn default() -> Self {
        Self {
            write_start_line: true,
            protocol_fields: false,
            request_timeout_secs: None,
            print_panics: false,
        }
    }
}
