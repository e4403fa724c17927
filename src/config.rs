// Configuration File Support
//
// This module provides configuration file parsing for the diagnostics service.
// Supports TOML format with environment variable overrides.
// Configuration files are loaded from XDG config directory: ~/.config/admin-diagnostics/config.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::tools::{ExecutionTimeout, ExecutorConfig, MAX_OUTPUT_SIZE, MAX_TIMEOUT_SECS};

/// Prefix for every environment override
pub const ENV_PREFIX: &str = "ADMIN_DIAG_";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// HTTP listener configuration
    pub server: ServerConfig,

    /// Admin authentication
    pub auth: AuthConfig,

    /// Diagnostic execution limits
    pub executor: ExecutorSettings,

    /// Metrics configuration
    pub metrics: MetricsConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Convert log level string to tracing::Level
    pub fn tracing_level(&self) -> Result<tracing::Level> {
        self.level
            .to_lowercase()
            .parse()
            .map_err(|e| anyhow::anyhow!("Failed to parse log level: {}", e))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to bind
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuthConfig {
    /// Bearer token that identifies an administrator. Empty denies everyone.
    pub admin_token: String,
}

/// Diagnostic execution settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExecutorSettings {
    /// Subprocess timeout in seconds
    pub timeout_secs: u64,

    /// Output cap in bytes per stream
    pub max_output_bytes: usize,

    /// Return captured stderr to the caller on failure
    pub expose_stderr: bool,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_output_bytes: MAX_OUTPUT_SIZE,
            expose_stderr: false,
        }
    }
}

impl ExecutorSettings {
    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            timeout: ExecutionTimeout::new(Duration::from_secs(self.timeout_secs)),
            max_output_size: self.max_output_bytes,
        }
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Expose `/metrics` on the HTTP listener
    pub enabled: bool,
}

impl Config {
    /// Load configuration from the default XDG config directory
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    /// If the config file does not exist, returns default configuration.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed, or
    /// if the result fails validation.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file from {:?}", path))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file from {:?}", path))?;
            tracing::info!("Loaded configuration from {:?}", path);
            config
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            Self::default()
        };

        let config = config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path
    pub fn config_path() -> PathBuf {
        if let Some(proj_dirs) =
            directories::ProjectDirs::from("com", "admin-diagnostics", "admin-diagnostics")
        {
            proj_dirs.config_dir().join("config.toml")
        } else {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home)
                .join(".config")
                .join("admin-diagnostics")
                .join("config.toml")
        }
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Environment variables take precedence over config file values:
    /// - ADMIN_DIAG_LOG_LEVEL
    /// - ADMIN_DIAG_LOG_FORMAT
    /// - ADMIN_DIAG_LISTEN
    /// - ADMIN_DIAG_ADMIN_TOKEN
    /// - ADMIN_DIAG_TIMEOUT_SECS
    /// - ADMIN_DIAG_MAX_OUTPUT_BYTES
    /// - ADMIN_DIAG_EXPOSE_STDERR
    /// - ADMIN_DIAG_METRICS_ENABLED
    pub fn apply_env_overrides(self) -> Self {
        self.apply_overrides(|name| std::env::var(format!("{ENV_PREFIX}{name}")).ok())
    }

    /// Apply overrides from an arbitrary lookup, keyed without the prefix.
    /// Values that do not parse or are out of range are ignored.
    pub fn apply_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Some(listen) = lookup("LISTEN") {
            self.server.listen = listen;
        }
        if let Some(token) = lookup("ADMIN_TOKEN") {
            self.auth.admin_token = token;
        }
        if let Some(secs) = lookup("TIMEOUT_SECS").and_then(|v| v.parse::<u64>().ok()) {
            if (1..=MAX_TIMEOUT_SECS).contains(&secs) {
                self.executor.timeout_secs = secs;
            }
        }
        if let Some(bytes) = lookup("MAX_OUTPUT_BYTES").and_then(|v| v.parse::<usize>().ok()) {
            if bytes > 0 {
                self.executor.max_output_bytes = bytes;
            }
        }
        if let Some(expose) = lookup("EXPOSE_STDERR") {
            self.executor.expose_stderr = expose.parse().unwrap_or(self.executor.expose_stderr);
        }
        if let Some(enabled) = lookup("METRICS_ENABLED") {
            self.metrics.enabled = enabled.parse().unwrap_or(self.metrics.enabled);
        }

        self
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                self.logging.level
            ),
        }

        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" | "compact" => {}
            _ => anyhow::bail!(
                "Invalid log format: {}. Must be one of: json, pretty, compact",
                self.logging.format
            ),
        }

        self.listen_addr()?;

        if !(1..=MAX_TIMEOUT_SECS).contains(&self.executor.timeout_secs) {
            anyhow::bail!(
                "Executor timeout must be between 1 and {} seconds",
                MAX_TIMEOUT_SECS
            );
        }
        if self.executor.max_output_bytes == 0 {
            anyhow::bail!("Executor output limit must be > 0");
        }

        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.server
            .listen
            .parse()
            .with_context(|| format!("Invalid listen address: {}", self.server.listen))
    }
}
