//! Configuration management for wfdebug
//!
//! Settings are resolved in three layers, lowest precedence first:
//! built-in defaults, `WFDEBUG_*` environment variables, then a
//! `wfdebug.yaml` file. The resolved [`DiagConfig`] is passed explicitly to
//! whatever needs it; there is no process-wide instance.

use crate::common::duration::parse_duration;
use crate::common::env_loader::EnvLoader;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const CONFIG_FILENAME: &str = "wfdebug.yaml";
const ENV_PREFIX: &str = "WFDEBUG";

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// Failed to read a configuration file from disk
    #[error("Failed to read configuration file {path}: {source}")]
    FileRead {
        /// Path to the configuration file that could not be read
        path: PathBuf,
        /// Underlying I/O error that occurred during file reading
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse YAML content from a configuration file
    #[error("Invalid YAML syntax in {path}:\n{source}\n\nHint: Check for proper indentation and YAML formatting")]
    YamlParse {
        /// Path to the configuration file with invalid YAML content
        path: PathBuf,
        /// Underlying YAML parsing error
        #[source]
        source: serde_yaml::Error,
    },

    /// Invalid configuration value for a specific field
    #[error("Invalid configuration value for '{field}': {value}\n{hint}")]
    InvalidValue {
        /// Name of the configuration field that has an invalid value
        field: String,
        /// The invalid value that was provided
        value: String,
        /// Helpful hint about how to fix the issue
        hint: String,
    },

    /// Configuration validation failed
    #[error("Configuration validation failed: {message}")]
    Validation {
        /// Descriptive message about the validation failure
        message: String,
    },
}

/// Resolved configuration for the diagnostics engine and CLI
#[derive(Debug, Clone, PartialEq)]
pub struct DiagConfig {
    /// Namespace used when a command does not name one (default: "default")
    pub namespace: String,
    /// Extra namespaces the traverser may cross into (default: none)
    pub follow_namespaces: Vec<String>,
    /// Maximum trace depth, 0 for unlimited (default: 0)
    pub max_depth: usize,
    /// Look-back window for failure listings (default: 1h)
    pub failures_since: Duration,
    /// Maximum number of failure reports (default: 50)
    pub failures_limit: usize,
    /// Events per history page requested from the service (default: 256)
    pub history_page_size: usize,
    /// Deadline applied to a whole top-level operation (default: 30s)
    pub request_timeout: Duration,
    /// Directory of exported history fixtures (default: unset)
    pub history_dir: Option<PathBuf>,
}

impl Default for DiagConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            follow_namespaces: Vec::new(),
            max_depth: 0,
            failures_since: Duration::from_secs(3_600),
            failures_limit: 50,
            history_page_size: 256,
            request_timeout: Duration::from_secs(30),
            history_dir: None,
        }
    }
}

impl DiagConfig {
    /// Load configuration from defaults, environment and the first
    /// `wfdebug.yaml` found by [`DiagConfig::find_yaml_config_file`]
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_file(Self::find_yaml_config_file().as_deref())
    }

    /// Load configuration from defaults, environment and an explicit YAML file
    pub fn load_with_file(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_vars()?;

        if let Some(path) = path {
            let yaml = YamlConfig::load_from_file(path)?;
            yaml.apply_to_config(&mut config)?;
        } else {
            tracing::debug!("No configuration file, using environment and defaults");
        }

        config.validate()?;
        Ok(config)
    }

    fn apply_env_vars(&mut self) -> Result<(), ConfigError> {
        let loader = EnvLoader::new(ENV_PREFIX);

        self.namespace = loader.load_string("NAMESPACE", &self.namespace);
        if let Some(namespaces) = loader.load_list("FOLLOW_NAMESPACES") {
            self.follow_namespaces = namespaces;
        }
        self.max_depth = loader.load_parsed("MAX_DEPTH", self.max_depth);
        self.failures_limit = loader.load_parsed("FAILURES_LIMIT", self.failures_limit);
        self.history_page_size = loader.load_parsed("HISTORY_PAGE_SIZE", self.history_page_size);

        if let Some(raw) = loader.load_optional::<String>("FAILURES_SINCE") {
            self.failures_since = parse_duration_field("failures_since", &raw)?;
        }
        if let Some(secs) = loader.load_optional::<u64>("REQUEST_TIMEOUT_SECS") {
            self.request_timeout = Duration::from_secs(secs);
        }
        if let Some(dir) = loader.load_optional::<String>("HISTORY_DIR") {
            self.history_dir = Some(PathBuf::from(dir));
        }

        Ok(())
    }

    /// Find the wfdebug.yaml configuration file
    ///
    /// Search order:
    /// 1. Current working directory: `wfdebug.yaml`
    /// 2. `~/.config/wfdebug/wfdebug.yaml`
    /// 3. `~/wfdebug.yaml`
    pub fn find_yaml_config_file() -> Option<PathBuf> {
        let mut search_paths = vec![PathBuf::from(CONFIG_FILENAME)];

        if let Some(home_dir) = dirs::home_dir() {
            search_paths.push(home_dir.join(".config").join("wfdebug").join(CONFIG_FILENAME));
            search_paths.push(home_dir.join(CONFIG_FILENAME));
        }

        for config_path in search_paths {
            if let Some(path) = Self::check_config_file(&config_path) {
                tracing::debug!("Found configuration file: {:?}", path);
                return Some(path);
            }
        }

        tracing::debug!("No wfdebug.yaml configuration file found in any search location");
        None
    }

    /// Check if a configuration file exists and is a regular file
    pub fn check_config_file(config_path: &Path) -> Option<PathBuf> {
        match config_path.try_exists() {
            Ok(true) if config_path.is_file() => Some(config_path.to_path_buf()),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(
                    "Error checking for configuration file {:?}: {}",
                    config_path,
                    e
                );
                None
            }
        }
    }

    /// Validate the current configuration settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.namespace.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "namespace".to_string(),
                value: self.namespace.clone(),
                hint: "namespace cannot be empty".to_string(),
            });
        }

        if self.history_page_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "history_page_size".to_string(),
                value: "0".to_string(),
                hint: "history_page_size must be greater than zero".to_string(),
            });
        }

        if self.request_timeout.is_zero() {
            return Err(ConfigError::Validation {
                message: "request_timeout must be greater than zero".to_string(),
            });
        }

        if let Some(empty) = self.follow_namespaces.iter().find(|ns| ns.trim().is_empty()) {
            return Err(ConfigError::InvalidValue {
                field: "follow_namespaces".to_string(),
                value: empty.clone(),
                hint: "follow_namespaces entries cannot be empty".to_string(),
            });
        }

        Ok(())
    }

    /// Generate an example YAML configuration file content
    pub fn example_yaml_config() -> &'static str {
        r#"# wfdebug.yaml
namespace: "default"
follow_namespaces: []
max_depth: 0
failures_since: "1h"
failures_limit: 50
history_page_size: 256
request_timeout: "30s"
# history_dir: "./histories"
"#
    }
}

fn parse_duration_field(field: &str, raw: &str) -> Result<Duration, ConfigError> {
    parse_duration(raw).map_err(|hint| ConfigError::InvalidValue {
        field: field.to_string(),
        value: raw.to_string(),
        hint: format!("{hint}. Use <n>[s|m|h|d], for example 15m or 1h"),
    })
}

/// Configuration loaded from a wfdebug.yaml file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct YamlConfig {
    /// Default namespace
    pub namespace: Option<String>,
    /// Namespaces the traverser may cross into
    pub follow_namespaces: Option<Vec<String>>,
    /// Maximum trace depth
    pub max_depth: Option<usize>,
    /// Look-back window, e.g. "1h"
    pub failures_since: Option<String>,
    /// Maximum number of failure reports
    pub failures_limit: Option<usize>,
    /// History page size
    pub history_page_size: Option<usize>,
    /// Operation deadline, e.g. "30s"
    pub request_timeout: Option<String>,
    /// Fixture directory
    pub history_dir: Option<PathBuf>,
}

impl YamlConfig {
    /// Load YAML configuration from a file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        tracing::info!("Loading YAML configuration from: {:?}", path);

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        serde_yaml::from_str(&content).map_err(|e| ConfigError::YamlParse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Apply YAML values on top of an existing configuration
    pub fn apply_to_config(&self, config: &mut DiagConfig) -> Result<(), ConfigError> {
        if let Some(ref namespace) = self.namespace {
            config.namespace = namespace.clone();
        }
        if let Some(ref namespaces) = self.follow_namespaces {
            config.follow_namespaces = namespaces.clone();
        }
        if let Some(max_depth) = self.max_depth {
            config.max_depth = max_depth;
        }
        if let Some(ref since) = self.failures_since {
            config.failures_since = parse_duration_field("failures_since", since)?;
        }
        if let Some(limit) = self.failures_limit {
            config.failures_limit = limit;
        }
        if let Some(page_size) = self.history_page_size {
            config.history_page_size = page_size;
        }
        if let Some(ref timeout) = self.request_timeout {
            config.request_timeout = parse_duration_field("request_timeout", timeout)?;
        }
        if let Some(ref dir) = self.history_dir {
            config.history_dir = Some(dir.clone());
        }
        Ok(())
    }
}
