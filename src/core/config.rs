use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Upper bound for `auth.token_ttl`: ten years
pub const MAX_TOKEN_TTL: u64 = 10 * 365 * 86_400;

/// Upper bound for `auth.lockout_window`: one week
pub const MAX_LOCKOUT_WINDOW: u64 = 7 * 86_400;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub performance: PerformanceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Administrator created on first start when no account uses its email
    pub bootstrap: Option<BootstrapConfig>,
    /// Basic auth credentials for the API docs. Docs are not served without it.
    pub docs: Option<DocsConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_wal_path")]
    pub wal_path: PathBuf,
    /// Rewrite the WAL as a snapshot after replay
    #[serde(default = "default_compact_on_startup")]
    pub compact_on_startup: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Expected value of the X-Credentials header
    pub app_key: String,
    /// Token lifetime in seconds, 0 disables expiry
    #[serde(default = "default_token_ttl")]
    pub token_ttl: u64,
    #[serde(default = "default_max_failed_logins")]
    pub max_failed_logins: u32,
    /// Seconds an address stays locked after too many failed logins
    #[serde(default = "default_lockout_window")]
    pub lockout_window: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PerformanceConfig {
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default = "default_console")]
    pub console: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapConfig {
    pub fullname: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DocsConfig {
    pub user: String,
    pub password: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            num_threads: default_num_threads(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            wal_path: default_wal_path(),
            compact_on_startup: default_compact_on_startup(),
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            cleanup_interval: default_cleanup_interval(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            console: default_console(),
        }
    }
}

impl AuthConfig {
    pub fn token_ttl(&self) -> Option<u64> {
        (self.token_ttl > 0).then_some(self.token_ttl)
    }
}

// Default value functions
fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_num_threads() -> usize {
    num_cpus::get()
}

fn default_wal_path() -> PathBuf {
    PathBuf::from("data/routeguard.wal")
}

fn default_compact_on_startup() -> bool {
    true
}

fn default_token_ttl() -> u64 {
    86_400 // 1 day
}

fn default_max_failed_logins() -> u32 {
    5
}

fn default_lockout_window() -> u64 {
    300 // 5 minutes
}

fn default_cleanup_interval() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_console() -> bool {
    false
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            bail!("Server port must be greater than 0");
        }

        if self.server.bind.trim().is_empty() {
            bail!("bind address must not be empty");
        }

        if self.server.num_threads == 0 {
            bail!("num_threads must be greater than 0");
        }

        if self.storage.wal_path.as_os_str().is_empty() {
            bail!("wal_path must not be empty");
        }

        if self.auth.app_key.is_empty() {
            bail!("app_key must not be empty");
        }

        if self.auth.max_failed_logins == 0 {
            bail!("max_failed_logins must be greater than 0");
        }

        if self.auth.token_ttl > MAX_TOKEN_TTL {
            bail!("token_ttl must not exceed {} seconds", MAX_TOKEN_TTL);
        }

        if self.auth.lockout_window == 0 {
            bail!("lockout_window must be greater than 0");
        }

        if self.auth.lockout_window > MAX_LOCKOUT_WINDOW {
            bail!("lockout_window must not exceed {} seconds", MAX_LOCKOUT_WINDOW);
        }

        if self.performance.cleanup_interval == 0 {
            bail!("cleanup_interval must be greater than 0");
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            bail!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.logging.level
            );
        }

        let valid_formats = ["json", "console"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            bail!(
                "Invalid log format '{}'. Must be one of: json, console",
                self.logging.format
            );
        }

        if let Some(bootstrap) = &self.bootstrap {
            if bootstrap.fullname.trim().is_empty() {
                bail!("bootstrap.fullname must not be empty");
            }
            if !bootstrap.email.contains('@') {
                bail!("bootstrap.email must be an email address");
            }
            if bootstrap.password.len() < 8 {
                bail!("bootstrap.password must be at least 8 characters");
            }
        }

        if let Some(docs) = &self.docs {
            if docs.user.is_empty() || docs.user.contains(':') {
                bail!("docs.user must be non-empty and must not contain ':'");
            }
            if docs.password.is_empty() {
                bail!("docs.password must not be empty");
            }
        }

        Ok(())
    }
}
