//! Configuration loading and defaults.
//!
//! Configuration is resolved in order of precedence (highest wins):
//!
//! 1. **Environment variables**: `EIGHT_SLEEP_EMAIL`, `EIGHT_SLEEP_PASSWORD`,
//!    `EIGHT_SLEEP_CLIENT_ID`, `EIGHT_SLEEP_CLIENT_SECRET`,
//!    `EIGHT_SLEEP_USER_ID`, `EIGHT_SLEEP_API_URL`, `EIGHT_SLEEP_AUTH_URL`,
//!    `EIGHT_SLEEP_TIMEZONE`, `EIGHT_SLEEP_TIMEOUT_SECS`, `EIGHT_SLEEP_LOG`,
//!    `PORT`
//! 2. **JSON file**: path via `--config <path>` or `EIGHT_SLEEP_CONFIG`
//! 3. **Compiled defaults**: see each field's default value below
//!
//! The JSON file mirrors the struct hierarchy:
//!
//! ```json
//! {
//!   "credentials": {
//!     "email": "sleeper@example.com",
//!     "password": "hunter2",
//!     "client_id": "...",
//!     "client_secret": "...",
//!     "user_id": "..."
//!   },
//!   "api": {
//!     "api_url": "https://client-api.8slp.net/v1",
//!     "auth_url": "https://auth-api.8slp.net/v1/tokens",
//!     "timezone": "America/New_York",
//!     "timeout_secs": 30
//!   },
//!   "logging": { "level": "info" }
//! }
//! ```
//!
//! Missing email or password is not a load error. The client reports it at
//! the first authentication attempt.

use std::path::{Path, PathBuf};

use clap::Parser;
use serde::Deserialize;

use crate::error::{EightSleepError, Result};

/// CLI arguments parsed by `clap`.
#[derive(Parser, Debug)]
#[command(name = "eight-sleep-mcp", version, about = "MCP server for Eight Sleep pods")]
pub struct Cli {
    /// Path to a JSON config file. Falls back to `EIGHT_SLEEP_CONFIG`.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// tracing filter, e.g. `debug` or `eight_sleep_mcp=trace`. Overridden by `RUST_LOG`.
    #[arg(long)]
    pub log_level: Option<String>,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub credentials: Credentials,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Port from the hosting environment. Logged at startup, not used by stdio.
    #[serde(default)]
    pub port: Option<u16>,
}

/// Account credentials for the password grant.
///
/// `Debug` is manually implemented to redact secrets.
#[derive(Clone, Default, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    /// User whose pod is controlled when a tool call names no `user_id`.
    #[serde(default)]
    pub user_id: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("user_id", &self.user_id)
            .finish()
    }
}

impl Credentials {
    /// Email and password are both present.
    pub fn is_complete(&self) -> bool {
        !self.email.is_empty() && !self.password.is_empty()
    }
}

/// Vendor endpoints and request settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Base URL for resource calls (default `https://client-api.8slp.net/v1`).
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Token endpoint for the password grant (default `https://auth-api.8slp.net/v1/tokens`).
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    /// Timezone sent with sleep trend queries (default `America/New_York`).
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Per-request timeout in seconds (default 30).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// tracing filter level (default `info`). Overridden by `RUST_LOG` env var.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_api_url() -> String {
    "https://client-api.8slp.net/v1".to_string()
}
fn default_auth_url() -> String {
    "https://auth-api.8slp.net/v1/tokens".to_string()
}
fn default_timezone() -> String {
    "America/New_York".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            auth_url: default_auth_url(),
            timezone: default_timezone(),
            timeout_secs: default_timeout_secs(),
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

impl Config {
    /// Load configuration from CLI args, an optional JSON file and the process environment.
    pub fn load(cli: &Cli) -> Result<Self> {
        let path = cli
            .config
            .clone()
            .or_else(|| std::env::var("EIGHT_SLEEP_CONFIG").ok().map(PathBuf::from));
        let mut config = Self::resolve(path.as_deref(), |key| std::env::var(key).ok())?;
        if let Some(level) = &cli.log_level {
            config.logging.level.clone_from(level);
        }
        Ok(config)
    }

    /// Resolve configuration from an optional file and an environment lookup.
    ///
    /// `lookup` returns the value of an environment variable, if set.
    pub fn resolve<F>(path: Option<&Path>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(p) => Self::from_file(&expand_tilde(p))?,
            None => Self::default(),
        };
        config.apply_env(lookup)?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            EightSleepError::Configuration(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;
        Self::from_json(&contents).map_err(|e| e.context(&path.display().to_string()))
    }

    /// Parse a JSON config document. Missing sections take their defaults.
    pub fn from_json(contents: &str) -> Result<Self> {
        serde_json::from_str(contents).map_err(|e| {
            EightSleepError::Configuration(format!("Failed to parse config file: {e}"))
        })
    }

    /// Apply environment overrides. Empty variables are treated as unset.
    fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let creds = &mut self.credentials;
        for (key, slot) in [
            ("EIGHT_SLEEP_EMAIL", &mut creds.email),
            ("EIGHT_SLEEP_PASSWORD", &mut creds.password),
            ("EIGHT_SLEEP_CLIENT_ID", &mut creds.client_id),
            ("EIGHT_SLEEP_CLIENT_SECRET", &mut creds.client_secret),
            ("EIGHT_SLEEP_USER_ID", &mut creds.user_id),
            ("EIGHT_SLEEP_API_URL", &mut self.api.api_url),
            ("EIGHT_SLEEP_AUTH_URL", &mut self.api.auth_url),
            ("EIGHT_SLEEP_TIMEZONE", &mut self.api.timezone),
            ("EIGHT_SLEEP_LOG", &mut self.logging.level),
        ] {
            if let Some(value) = get(key) {
                *slot = value;
            }
        }

        if let Some(raw) = get("EIGHT_SLEEP_TIMEOUT_SECS") {
            self.api.timeout_secs = parse_number("EIGHT_SLEEP_TIMEOUT_SECS", &raw)?;
        }
        if let Some(raw) = get("PORT") {
            self.port = Some(parse_number("PORT", &raw)?);
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| EightSleepError::Configuration(format!("{key} is not a valid number: {raw}")))
}

/// Expand a leading `~` to `$HOME`.
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    path.to_path_buf()
}
