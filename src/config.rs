//! Configuration loading and defaults.
//!
//! Configuration is resolved in order of precedence (highest wins):
//!
//! 1. **Environment variables** — `PROVCTL_API_KEY`, `PROVCTL_LISTEN`,
//!    `PROVCTL_RATE_LIMIT_MAX`, `PROVCTL_RATE_LIMIT_WINDOW_SECS`
//! 2. **Config file** — path via `--config <path>`, or `provctl.toml` in CWD
//! 3. **Compiled defaults** — see each field's default value below
//!
//! The TOML file mirrors the struct hierarchy:
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0:8080"
//! max_batch_size = 100
//!
//! [auth]
//! api_key = "your-secret-key"   # empty = authentication disabled
//!
//! [rate_limit]
//! max_requests = 100
//! window_secs = 60
//! sweep_interval_secs = 300
//! retention_secs = 600
//! trust_forwarded_for = false
//!
//! [ssh]
//! default_port = 22
//! connect_timeout_secs = 15
//! command_timeout_secs = 120      # 0 = no per-command deadline
//! verify_host_key = false
//! trusted_host_keys = ["SHA256:..."]
//!
//! [logging]
//! level = "info"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Default config file looked up in the working directory.
const DEFAULT_CONFIG_FILE: &str = "provctl.toml";

/// Errors raised while resolving the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value for {var}: {value:?}")]
    Env { var: &'static str, value: String },
}

/// Top-level configuration, deserialized from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub ssh: SshConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind (default `0.0.0.0:8080`).
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Maximum commands per provisioning request (default 100).
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

/// Authentication settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// Pre-shared API key. Override with `PROVCTL_API_KEY`.
    /// Empty disables authentication entirely, which is logged at startup.
    #[serde(default)]
    pub api_key: String,
}

/// Per-client token bucket settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Requests allowed per window per client (default 100).
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
    /// Refill window in seconds (default 60).
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// Seconds between idle-bucket sweeps (default 300).
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Buckets idle longer than this are dropped by the sweep (default 600).
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    /// Key clients by `X-Forwarded-For` / `X-Real-IP` instead of the peer
    /// address. Only enable behind a trusted reverse proxy.
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

/// Outbound SSH settings applied to every router session.
#[derive(Debug, Clone, Deserialize)]
pub struct SshConfig {
    /// Port used when a request doesn't carry one (default 22).
    #[serde(default = "default_ssh_port")]
    pub default_port: u16,
    /// Dial + handshake + auth deadline in seconds (default 15).
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Per-command deadline in seconds (default 120, 0 = unbounded).
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
    /// Check router host keys against `trusted_host_keys` (default false).
    #[serde(default)]
    pub verify_host_key: bool,
    /// SHA-256 host key fingerprints accepted when `verify_host_key` is set.
    #[serde(default)]
    pub trusted_host_keys: Vec<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// tracing filter level (default `info`). Overridden by `RUST_LOG` env var.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_max_batch_size() -> usize {
    100
}
fn default_max_requests() -> u32 {
    100
}
fn default_window_secs() -> u64 {
    60
}
fn default_sweep_interval_secs() -> u64 {
    5 * 60
}
fn default_retention_secs() -> u64 {
    10 * 60
}
fn default_ssh_port() -> u16 {
    22
}
fn default_connect_timeout_secs() -> u64 {
    15
}
fn default_command_timeout_secs() -> u64 {
    120
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            max_batch_size: default_max_batch_size(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            retention_secs: default_retention_secs(),
            trust_forwarded_for: false,
        }
    }
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            default_port: default_ssh_port(),
            connect_timeout_secs: default_connect_timeout_secs(),
            command_timeout_secs: default_command_timeout_secs(),
            verify_host_key: false,
            trusted_host_keys: Vec::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

impl SshConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// `None` when the per-command deadline is disabled.
    pub fn command_timeout(&self) -> Option<Duration> {
        (self.command_timeout_secs > 0).then(|| Duration::from_secs(self.command_timeout_secs))
    }
}

impl Config {
    /// Load configuration with the precedence chain: env vars > file > defaults.
    ///
    /// If `path` is `Some`, that file must exist. Otherwise `provctl.toml` in
    /// the current directory is used when present.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(DEFAULT_CONFIG_FILE)?
            }
            None => Config::default(),
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    /// Parse a TOML document.
    pub fn from_toml(content: &str, path: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        Self::from_toml(&content, path)
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(key) = lookup("PROVCTL_API_KEY") {
            self.auth.api_key = key;
        }
        if let Some(listen) = lookup("PROVCTL_LISTEN") {
            self.server.listen = listen;
        }
        if let Some(value) = lookup("PROVCTL_RATE_LIMIT_MAX") {
            self.rate_limit.max_requests = value.trim().parse().map_err(|_| ConfigError::Env {
                var: "PROVCTL_RATE_LIMIT_MAX",
                value: value.clone(),
            })?;
        }
        if let Some(value) = lookup("PROVCTL_RATE_LIMIT_WINDOW_SECS") {
            self.rate_limit.window_secs =
                value.trim().parse().map_err(|_| ConfigError::Env {
                    var: "PROVCTL_RATE_LIMIT_WINDOW_SECS",
                    value: value.clone(),
                })?;
        }
        Ok(())
    }
}
