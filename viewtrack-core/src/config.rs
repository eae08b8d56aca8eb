//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/viewtrack/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/viewtrack/` (~/.config/viewtrack/)
//! - State/Logs: `$XDG_STATE_HOME/viewtrack/` (~/.local/state/viewtrack/)

use crate::error::{Error, Result};
use crate::types::PageView;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Default collection endpoint
pub const DEFAULT_API_ROUTE: &str = "https://happykit.dev/api/pv";

/// Hostname used during local development
pub const LOCAL_DEV_HOSTNAME: &str = "localhost";

/// Predicate deciding whether a classified view should be dropped.
///
/// Returning `true` skips the view.
pub type SkipFn = Arc<dyn Fn(&PageView) -> bool + Send + Sync>;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Tracker configuration
    #[serde(default)]
    pub tracker: TrackerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Page-view tracker configuration
#[derive(Deserialize, Clone)]
pub struct TrackerConfig {
    /// Public key identifying the site to the collection endpoint (required)
    #[serde(default)]
    pub public_key: String,

    /// Collection endpoint views are posted to
    #[serde(default = "default_api_route")]
    pub api_route: String,

    /// Hostnames whose views are never delivered (case-insensitive)
    #[serde(default = "default_skip_hostnames")]
    pub skip_hostnames: Vec<String>,

    /// Idle time after the last view before the queue is flushed
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    /// Document hostname reported by the host environment
    #[serde(default = "default_hostname")]
    pub hostname: String,

    /// User agent reported by the host environment
    pub user_agent: Option<String>,

    /// Time zone reported by the host environment (falls back to `$TZ`)
    pub time_zone: Option<String>,

    /// Whether the host environment offers the non-blocking beacon channel
    #[serde(default = "default_beacon")]
    pub beacon: bool,

    /// HTTP request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Caller-supplied skip predicate (code only)
    #[serde(skip)]
    pub skip: Option<SkipFn>,
}

impl fmt::Debug for TrackerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackerConfig")
            .field("public_key", &self.public_key)
            .field("api_route", &self.api_route)
            .field("skip_hostnames", &self.skip_hostnames)
            .field("delay_ms", &self.delay_ms)
            .field("hostname", &self.hostname)
            .field("user_agent", &self.user_agent)
            .field("time_zone", &self.time_zone)
            .field("beacon", &self.beacon)
            .field("timeout_secs", &self.timeout_secs)
            .field("skip", &self.skip.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            public_key: String::new(),
            api_route: default_api_route(),
            skip_hostnames: default_skip_hostnames(),
            delay_ms: default_delay_ms(),
            hostname: default_hostname(),
            user_agent: None,
            time_zone: None,
            beacon: default_beacon(),
            timeout_secs: default_timeout(),
            skip: None,
        }
    }
}

impl TrackerConfig {
    /// Create a config with the given public key and defaults for everything else
    pub fn new(public_key: impl Into<String>) -> Self {
        Self {
            public_key: public_key.into(),
            ..Default::default()
        }
    }

    /// Attach a skip predicate
    pub fn with_skip<F>(mut self, skip: F) -> Self
    where
        F: Fn(&PageView) -> bool + Send + Sync + 'static,
    {
        self.skip = Some(Arc::new(skip));
        self
    }

    /// Check if a public key is present
    pub fn is_ready(&self) -> bool {
        !self.public_key.trim().is_empty()
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if !self.is_ready() {
            return Err(Error::Config("missing options.publicKey".to_string()));
        }
        if self.api_route.trim().is_empty() {
            return Err(Error::Config("tracker.api_route must not be empty".to_string()));
        }
        Ok(())
    }

    /// Idle delay before a queued batch is flushed
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Timeout for the blocking delivery path
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_api_route() -> String {
    DEFAULT_API_ROUTE.to_string()
}

fn default_skip_hostnames() -> Vec<String> {
    vec![LOCAL_DEV_HOSTNAME.to_string()]
}

fn default_delay_ms() -> u64 {
    5000
}

fn default_hostname() -> String {
    LOCAL_DEV_HOSTNAME.to_string()
}

fn default_beacon() -> bool {
    true
}

fn default_timeout() -> u64 {
    30
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/viewtrack/config.toml` (~/.config/viewtrack/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("viewtrack").join("config.toml")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/viewtrack/` (~/.local/state/viewtrack/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("viewtrack")
    }

    /// Returns the log file path
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("viewtrack.log")
    }
}
