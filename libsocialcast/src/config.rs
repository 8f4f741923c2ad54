//! Configuration management for Socialcast

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::types::Platform;

const DEFAULT_GRAPH_VERSION: &str = "v18.0";

/// Calls per window when a platform has no `[rate_limits.<platform>]` entry
pub const DEFAULT_MAX_CALLS: usize = 100;
pub const DEFAULT_WINDOW_SECS: u64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub rate_limits: HashMap<Platform, RateLimitConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// age X25519 identity (`AGE-SECRET-KEY-1...`) used to encrypt tokens at rest
    #[serde(default)]
    pub encryption_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    #[serde(default)]
    pub app_id: String,
    #[serde(default)]
    pub app_secret: String,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_oauth_port")]
    pub port: u16,
    #[serde(default = "default_oauth_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_oauth_url")]
    pub oauth_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_graph_url")]
    pub graph_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

/// Sliding-window budget for one platform.
///
/// Platforms that name the same `group` share a single window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_max_calls")]
    pub max_calls: usize,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    #[serde(default)]
    pub group: Option<String>,
}

fn default_db_path() -> String {
    "~/.local/share/socialcast/socialcast.db".to_string()
}

fn default_redirect_uri() -> String {
    format!("http://localhost:{}/callback", default_oauth_port())
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_oauth_port() -> u16 {
    8080
}

fn default_oauth_timeout() -> u64 {
    300
}

fn default_oauth_url() -> String {
    format!("https://www.facebook.com/{}/dialog/oauth", DEFAULT_GRAPH_VERSION)
}

fn default_token_url() -> String {
    format!(
        "https://graph.facebook.com/{}/oauth/access_token",
        DEFAULT_GRAPH_VERSION
    )
}

fn default_graph_url() -> String {
    format!("https://graph.facebook.com/{}", DEFAULT_GRAPH_VERSION)
}

fn default_poll_interval() -> u64 {
    60
}

fn default_max_calls() -> usize {
    DEFAULT_MAX_CALLS
}

fn default_window_secs() -> u64 {
    DEFAULT_WINDOW_SECS
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            app_secret: String::new(),
            redirect_uri: default_redirect_uri(),
            bind_address: default_bind_address(),
            port: default_oauth_port(),
            timeout_secs: default_oauth_timeout(),
            oauth_url: default_oauth_url(),
            token_url: default_token_url(),
            graph_url: default_graph_url(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_calls: DEFAULT_MAX_CALLS,
            window_secs: DEFAULT_WINDOW_SECS,
            group: None,
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl OAuthConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Address the callback listener binds to
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let mut config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            database: DatabaseConfig::default(),
            security: SecurityConfig::default(),
            oauth: OAuthConfig::default(),
            scheduler: SchedulerConfig::default(),
            rate_limits: HashMap::new(),
        }
    }

    /// Secrets may come from the environment instead of the file
    pub fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("SOCIALCAST_APP_ID") {
            self.oauth.app_id = value;
        }
        if let Ok(value) = std::env::var("SOCIALCAST_APP_SECRET") {
            self.oauth.app_secret = value;
        }
        if let Ok(value) = std::env::var("SOCIALCAST_ENCRYPTION_KEY") {
            self.security.encryption_key = value;
        }
        if let Ok(value) = std::env::var("SOCIALCAST_DB_PATH") {
            self.database.path = value;
        }
    }

    /// Checks that hold regardless of which binary is running
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "scheduler.poll_interval_secs".to_string(),
                reason: "must be at least 1 second".to_string(),
            }
            .into());
        }

        for (platform, limit) in &self.rate_limits {
            if limit.max_calls == 0 || limit.window_secs == 0 {
                return Err(ConfigError::InvalidValue {
                    field: format!("rate_limits.{}", platform),
                    reason: "max_calls and window_secs must be positive".to_string(),
                }
                .into());
            }
        }

        Ok(())
    }

    /// Checks needed before starting an OAuth handshake
    pub fn validate_oauth(&self) -> Result<()> {
        if self.oauth.app_id.trim().is_empty() {
            return Err(ConfigError::MissingField("oauth.app_id".to_string()).into());
        }
        if self.oauth.app_secret.trim().is_empty() {
            return Err(ConfigError::MissingField("oauth.app_secret".to_string()).into());
        }
        if self.oauth.redirect_uri.trim().is_empty() {
            return Err(ConfigError::MissingField("oauth.redirect_uri".to_string()).into());
        }
        Ok(())
    }

    /// The configured encryption key, or an error naming where to put one
    pub fn encryption_key(&self) -> Result<&str> {
        let key = self.security.encryption_key.trim();
        if key.is_empty() {
            return Err(ConfigError::MissingField(
                "security.encryption_key (or SOCIALCAST_ENCRYPTION_KEY)".to_string(),
            )
            .into());
        }
        Ok(key)
    }

    /// Budget for `platform`, falling back to the default window
    pub fn rate_limit_for(&self, platform: Platform) -> RateLimitConfig {
        self.rate_limits.get(&platform).cloned().unwrap_or_default()
    }
}

/// Resolve the configuration file path (`$SOCIALCAST_CONFIG`, then the XDG config dir)
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("SOCIALCAST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("socialcast").join("config.toml"))
}
