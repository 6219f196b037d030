use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    /// Bootstrap upstream connection, used when the database has no active config.
    #[serde(default)]
    pub jellyfin: Option<JellyfinConfig>,

    #[serde(default)]
    pub proxy: ProxyConfig,

    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Externally visible base URL (e.g. `https://films.example.com`).
    /// When unset, the proxy derives it from request headers.
    #[serde(default)]
    pub public_url: Option<String>,

    /// SQLite database file. Defaults to `ifilm.db` next to the config file.
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Built frontend to serve with SPA fallback.
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: None,
            database_path: None,
            static_dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct JellyfinConfig {
    pub url: String,

    pub api_key: String,
}

/// Low-privilege account the stream proxy authenticates as.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProxyConfig {
    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,
}

fn default_token_ttl() -> u64 {
    3600
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            token_ttl_secs: default_token_ttl(),
        }
    }
}

impl ProxyConfig {
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }

    /// Username and password, when both are configured.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(password)) if !user.is_empty() => Some((user, password)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// TTL for library lists and generic item queries.
    #[serde(default = "default_ttl")]
    pub default_ttl_secs: u64,

    /// TTL for item details and Movie/Series listings, kept short so content
    /// deleted upstream disappears quickly.
    #[serde(default = "default_item_ttl")]
    pub item_ttl_secs: u64,

    /// Interval of the background sweep of expired entries (0 disables it).
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_ttl() -> u64 {
    300
}
fn default_item_ttl() -> u64 {
    5
}
fn default_sweep_interval() -> u64 {
    60
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: default_ttl(),
            item_ttl_secs: default_item_ttl(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn item_ttl(&self) -> Duration {
        Duration::from_secs(self.item_ttl_secs)
    }
}
