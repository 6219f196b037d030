mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./config.toml",
        "./ifilm.toml",
        "~/.config/ifilm/config.toml",
        "/etc/ifilm/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    if let Some(ref public_url) = config.server.public_url {
        if !public_url.starts_with("http://") && !public_url.starts_with("https://") {
            anyhow::bail!("server.public_url must start with http:// or https://");
        }
    }

    if let Some(ref jellyfin) = config.jellyfin {
        if jellyfin.url.trim().is_empty() {
            anyhow::bail!("jellyfin.url cannot be empty");
        }
        if jellyfin.api_key.trim().is_empty() {
            anyhow::bail!("jellyfin.api_key cannot be empty");
        }
    }

    if config.proxy.username.is_some() != config.proxy.password.is_some() {
        anyhow::bail!("proxy.username and proxy.password must be set together");
    }

    if config.proxy.token_ttl_secs == 0 {
        anyhow::bail!("proxy.token_ttl_secs cannot be 0");
    }

    if config.cache.item_ttl_secs > config.cache.default_ttl_secs {
        tracing::warn!(
            "cache.item_ttl_secs ({}) is longer than cache.default_ttl_secs ({})",
            config.cache.item_ttl_secs,
            config.cache.default_ttl_secs
        );
    }

    Ok(())
}
