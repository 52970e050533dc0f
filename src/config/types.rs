use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::images::EncoderPolicy;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub upload: UploadConfig,

    #[serde(default)]
    pub encoder: EncoderPolicy,

    #[serde(default)]
    pub share: ShareConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Absolute base URL used in share links and Open Graph tags.
    #[serde(default = "default_public_url")]
    pub public_url: String,

    /// Shown as `og:site_name` on share pages
    #[serde(default = "default_site_name")]
    pub site_name: String,

    /// Directory holding `pixshare.db`
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_public_url() -> String {
    "http://localhost:8080".to_string()
}
fn default_site_name() -> String {
    "Pixshare".to_string()
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: default_public_url(),
            site_name: default_site_name(),
            data_dir: default_data_dir(),
        }
    }
}

impl ServerConfig {
    /// `public_url` without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.public_url.trim_end_matches('/')
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Allow anyone to create an account through the API
    #[serde(default = "default_allow_registration")]
    pub allow_registration: bool,

    /// Usernames treated as admins regardless of their stored flag
    #[serde(default)]
    pub admin_usernames: Vec<String>,

    /// Tokens idle for longer than this are rejected (default: 24)
    #[serde(default = "default_token_ttl")]
    pub token_ttl_hours: u64,
}

fn default_allow_registration() -> bool {
    true
}

fn default_token_ttl() -> u64 {
    24
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            allow_registration: default_allow_registration(),
            admin_usernames: Vec::new(),
            token_ttl_hours: default_token_ttl(),
        }
    }
}

impl AuthConfig {
    pub fn is_admin_username(&self, username: &str) -> bool {
        self.admin_usernames
            .iter()
            .any(|name| name.eq_ignore_ascii_case(username))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadConfig {
    /// Largest raw upload accepted, before encoding
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Timeout for fetching an image by URL
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// Let URL uploads reach loopback, private and link-local addresses
    #[serde(default)]
    pub allow_private_hosts: bool,
}

fn default_max_upload_bytes() -> usize {
    20 * 1024 * 1024
}

fn default_fetch_timeout() -> u64 {
    30
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: default_max_upload_bytes(),
            fetch_timeout_secs: default_fetch_timeout(),
            allow_private_hosts: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ShareConfig {
    /// User-Agent substrings (case-insensitive) that get the preview page
    #[serde(default = "default_crawler_agents")]
    pub crawler_agents: Vec<String>,

    /// Optional `theme-color` meta tag on share pages
    #[serde(default)]
    pub theme_color: Option<String>,
}

fn default_crawler_agents() -> Vec<String> {
    [
        "discord",
        "bot",
        "crawler",
        "spider",
        "facebookexternalhit",
        "embedly",
        "slack",
        "whatsapp",
        "telegram",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for ShareConfig {
    fn default() -> Self {
        Self {
            crawler_agents: default_crawler_agents(),
            theme_color: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert!(config.auth.allow_registration);
        assert_eq!(config.upload.max_upload_bytes, 20 * 1024 * 1024);
        assert_eq!(config.encoder, EncoderPolicy::default());
        assert!(config.share.crawler_agents.iter().any(|a| a == "discord"));
    }

    #[test]
    fn test_partial_sections() {
        let config: Config = toml::from_str(
            r#"
            [server]
            public_url = "https://img.example.com/"

            [auth]
            admin_usernames = ["Root"]

            [encoder]
            inline_limit = 600000
            "#,
        )
        .unwrap();

        assert_eq!(config.server.base_url(), "https://img.example.com");
        assert_eq!(config.server.host, "0.0.0.0");
        assert!(config.auth.is_admin_username("root"));
        assert!(!config.auth.is_admin_username("alice"));
        assert_eq!(config.encoder.inline_limit, 600_000);
        assert_eq!(config.encoder.pass_through_limit, 500_000);
        assert_eq!(config.encoder.tiers.len(), 3);
    }

    #[test]
    fn test_custom_tiers() {
        let config: Config = toml::from_str(
            r#"
            [[encoder.tiers]]
            above_bytes = 1000000
            max_dimension = 900
            quality = 0.5
            "#,
        )
        .unwrap();

        assert_eq!(config.encoder.tiers.len(), 1);
        assert_eq!(config.encoder.tiers[0].max_dimension, 900);
    }
}
