//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The admin token is loaded from MARKETPLACE_ADMIN_TOKEN or admin_token_file,
//! never stored in the TOML directly to avoid leaking secrets.

use common::Secret;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub marketplace: MarketplaceConfig,
    pub storage: StorageConfig,
    pub admin: AdminConfig,
    #[serde(default)]
    pub accounts: AccountsConfig,
}

/// Remote marketplace settings
#[derive(Debug, Deserialize)]
pub struct MarketplaceConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            timeout_secs: default_timeout(),
        }
    }
}

/// Where the license key lives on disk
#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    pub license_key_path: PathBuf,
}

/// Admin listener settings
#[derive(Debug, Deserialize)]
pub struct AdminConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(skip)]
    pub admin_token: Option<Secret<String>>,
    /// Path to a file containing the admin token (alternative to MARKETPLACE_ADMIN_TOKEN)
    #[serde(default)]
    pub admin_token_file: Option<PathBuf>,
}

/// Account creation policy
#[derive(Debug, Default, Deserialize)]
pub struct AccountsConfig {
    /// Empty means any domain is allowed
    #[serde(default)]
    pub allowed_email_domains: Vec<String>,
}

fn default_api_url() -> String {
    marketplace_api::constants::DEFAULT_API_URL.to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_max_connections() -> usize {
    64
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Admin token resolution order:
    /// 1. MARKETPLACE_ADMIN_TOKEN env var
    /// 2. admin_token_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if !config.marketplace.api_url.starts_with("http://")
            && !config.marketplace.api_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "api_url must start with http:// or https://, got: {}",
                config.marketplace.api_url
            )));
        }

        if config.marketplace.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if config.admin.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        // Env var takes precedence over file; a blank env var falls through
        let env_token = std::env::var("MARKETPLACE_ADMIN_TOKEN")
            .ok()
            .map(|t| t.trim().to_owned())
            .filter(|t| !t.is_empty());
        if let Some(token) = env_token {
            config.admin.admin_token = Some(Secret::new(token));
        } else if let Some(ref token_file) = config.admin.admin_token_file {
            let token = std::fs::read_to_string(token_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read admin_token_file {}: {e}",
                    token_file.display()
                ))
            })?;
            let token = token.trim().to_owned();
            if !token.is_empty() {
                config.admin.admin_token = Some(Secret::new(token));
            }
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("marketplace-admin.toml")
    }
}
