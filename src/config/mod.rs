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
        "./pixshare.toml",
        "./config.toml",
        "~/.config/pixshare/config.toml",
        "/etc/pixshare/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {:?}", path);
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

    let url = config.server.public_url.as_str();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        anyhow::bail!("server.public_url must start with http:// or https://");
    }

    if config.upload.max_upload_bytes == 0 {
        anyhow::bail!("upload.max_upload_bytes cannot be 0");
    }

    if config.auth.token_ttl_hours == 0 {
        anyhow::bail!("auth.token_ttl_hours cannot be 0");
    }

    config.encoder.validate()?;

    if config.share.crawler_agents.iter().any(|a| a.trim().is_empty()) {
        anyhow::bail!("share.crawler_agents cannot contain empty entries");
    }

    Ok(())
}
