/// Application configuration management
/// Stores user preferences in <config_dir>/cm-monitor/config.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::utils::constants::*;

/// Environment variable carrying a single admin token
pub const ENV_TOKEN: &str = "CM_MONITOR_TOKEN";
pub const ENV_PORT: &str = "CM_MONITOR_PORT";
pub const ENV_HOST: &str = "CM_MONITOR_HOST";

/// Owner that `CM_MONITOR_TOKEN` resolves to
pub const ENV_TOKEN_OWNER: &str = "admin";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub refresh_interval_secs: u64,
    pub adapter_timeout_secs: u64,
    pub server: ServerConfig,
    pub profile: ProfileConfig,
    /// token -> owner
    pub tokens: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors: bool,
    pub queue_capacity: usize,
    pub ping_interval_secs: u64,
    pub read_deadline_secs: u64,
    pub max_message_bytes: usize,
    pub publish_interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    pub duration_secs: u64,
    pub interval_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: DEFAULT_REFRESH_SECS,
            adapter_timeout_secs: DEFAULT_ADAPTER_TIMEOUT_SECS,
            server: ServerConfig::default(),
            profile: ProfileConfig::default(),
            tokens: HashMap::new(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_SERVER_HOST.to_string(),
            port: DEFAULT_SERVER_PORT,
            cors: false,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            ping_interval_secs: DEFAULT_PING_INTERVAL_SECS,
            read_deadline_secs: DEFAULT_READ_DEADLINE_SECS,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            publish_interval_secs: DEFAULT_REFRESH_SECS,
        }
    }
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            duration_secs: DEFAULT_PROFILE_DURATION_SECS,
            interval_secs: DEFAULT_PROFILE_INTERVAL_SECS,
        }
    }
}

impl AppConfig {
    /// Directory holding the config file and TUI logs
    pub fn config_dir() -> Result<PathBuf> {
        let base = dirs::config_dir().context("Could not determine the user config directory")?;
        Ok(base.join("cm-monitor"))
    }

    /// Get config file path
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load from the default location, then apply `.env` and environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load configuration from a file; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(config)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("Failed to create config directory")?;
        }
        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        fs::write(path, contents)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Overlay environment variables; `lookup` abstracts `std::env::var` for tests
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup(ENV_TOKEN).filter(|t| !t.trim().is_empty()) {
            self.tokens.insert(token.trim().to_string(), ENV_TOKEN_OWNER.to_string());
        }
        if let Some(port) = lookup(ENV_PORT) {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("{} must be a port number, got '{}'", ENV_PORT, port))?;
        }
        if let Some(host) = lookup(ENV_HOST).filter(|h| !h.trim().is_empty()) {
            self.server.host = host.trim().to_string();
        }
        Ok(())
    }

    /// Add a token for an owner and persist it
    pub fn add_token(&mut self, token: String, owner: &str) -> Result<()> {
        self.tokens.insert(token, owner.to_string());
        self.save()
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }

    pub fn adapter_timeout(&self) -> Duration {
        Duration::from_secs(self.adapter_timeout_secs.max(1))
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs.max(1))
    }

    pub fn read_deadline(&self) -> Duration {
        Duration::from_secs(self.read_deadline_secs.max(1))
    }

    pub fn publish_interval(&self) -> Duration {
        Duration::from_secs(self.publish_interval_secs.max(1))
    }
}

impl ProfileConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs.max(1))
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}
