//! Configuration management for remote-exec.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Environment variables
//! 2. Configuration file (JSON)
//! 3. Default values

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::execution::{ExecutorOptions, DEFAULT_POLL_INTERVAL};
use crate::resolve::{default_extensions, system_paths, PathResolver};
use crate::transport::{OpenSshSession, DEFAULT_SSH_PROGRAM};

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Executor configuration.
    pub executor: ExecutorSection,
    /// Command resolution configuration.
    pub resolver: ResolverSection,
    /// OpenSSH client configuration.
    pub ssh: SshSection,
    /// Logging configuration.
    pub logging: LoggingSection,
}

/// Executor configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSection {
    /// Input poll interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Default timeout in milliseconds; 0 means unbounded.
    pub default_timeout_ms: u64,
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            default_timeout_ms: 0,
        }
    }
}

/// Command resolution section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverSection {
    /// Directories searched before the `PATH` entries.
    pub extra_paths: Vec<PathBuf>,
    /// Executable suffixes tried after each command name.
    pub extensions: Vec<String>,
}

impl Default for ResolverSection {
    fn default() -> Self {
        Self {
            extra_paths: Vec::new(),
            extensions: default_extensions(),
        }
    }
}

/// OpenSSH client section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SshSection {
    /// ssh client binary.
    pub program: PathBuf,
    /// Extra `-o` options for every invocation.
    pub options: Vec<String>,
}

impl Default for SshSection {
    fn default() -> Self {
        Self {
            program: PathBuf::from(DEFAULT_SSH_PROGRAM),
            options: Vec::new(),
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (error, warn, info, debug, trace) or a filter directive.
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_vars(|name| std::env::var(name).ok())
    }

    /// Apply overrides from a variable lookup.
    ///
    /// Recognised variables: `REMOTE_EXEC_POLL_INTERVAL_MS`,
    /// `REMOTE_EXEC_TIMEOUT_MS`, `REMOTE_EXEC_EXTENSIONS` (comma separated,
    /// an empty item stands for the bare name), `REMOTE_EXEC_SSH`,
    /// `REMOTE_EXEC_LOG_LEVEL` and, failing that, `RUST_LOG`.
    pub fn apply_vars<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("REMOTE_EXEC_POLL_INTERVAL_MS") {
            self.executor.poll_interval_ms = parse_millis("REMOTE_EXEC_POLL_INTERVAL_MS", value)?;
        }

        if let Some(value) = lookup("REMOTE_EXEC_TIMEOUT_MS") {
            self.executor.default_timeout_ms = parse_millis("REMOTE_EXEC_TIMEOUT_MS", value)?;
        }

        if let Some(value) = lookup("REMOTE_EXEC_EXTENSIONS") {
            self.resolver.extensions = value.split(',').map(|s| s.trim().to_string()).collect();
        }

        if let Some(program) = lookup("REMOTE_EXEC_SSH") {
            if !program.is_empty() {
                self.ssh.program = PathBuf::from(program);
            }
        }

        if let Some(level) = lookup("REMOTE_EXEC_LOG_LEVEL") {
            self.logging.level = level;
        } else if let Some(level) = lookup("RUST_LOG") {
            self.logging.level = level;
        }

        Ok(())
    }

    /// Load configuration with full priority chain.
    ///
    /// Priority: env vars > config file > defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that deserialize fine but cannot be used.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.executor.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "executor.poll_interval_ms must be greater than zero".into(),
            ));
        }
        if self.resolver.extensions.is_empty() {
            return Err(ConfigError::Invalid(
                "resolver.extensions must contain at least one entry".into(),
            ));
        }
        Ok(())
    }

    /// Options for [`CommandExecutor`](crate::execution::CommandExecutor).
    pub fn executor_options(&self) -> ExecutorOptions {
        ExecutorOptions {
            poll_interval: Duration::from_millis(self.executor.poll_interval_ms),
            default_timeout: match self.executor.default_timeout_ms {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            },
        }
    }

    /// Resolver over the configured extra paths followed by `PATH`.
    pub fn path_resolver(&self) -> PathResolver {
        PathResolver::new(system_paths(), self.resolver.extensions.clone())
            .prepend_paths(self.resolver.extra_paths.iter().cloned())
    }

    /// OpenSSH session using the configured client and options.
    pub fn ssh_session(
        &self,
        destination: impl Into<String>,
        control_path: impl Into<PathBuf>,
    ) -> OpenSshSession {
        self.ssh.options.iter().fold(
            OpenSshSession::new(destination, control_path).with_program(&self.ssh.program),
            |session, option| session.with_option(option.as_str()),
        )
    }

    /// Get the log level filter string.
    pub fn log_filter(&self) -> &str {
        &self.logging.level
    }
}

fn parse_millis(name: &'static str, value: String) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(name, value))
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    /// JSON parsing error.
    #[error("failed to parse config file: {0}")]
    Json(#[from] serde_json::Error),
    /// Environment variable with an unusable value.
    #[error("invalid value for {0}: '{1}'")]
    InvalidValue(&'static str, String),
    /// Semantically invalid configuration.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
