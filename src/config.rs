//! Configuration management
//!
//! Loads configuration from config.toml with support for:
//! - Server binding settings
//! - Database location
//! - Input limits for bounties, requests and proofs

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

/// Main configuration structure matching config.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub limits: Limits,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file path
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "bounty-ledger.db".to_string(),
        }
    }
}

/// Input limits enforced before any unit of work starts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Limits {
    pub max_bounty_amount: u64,
    pub max_title_len: usize,
    pub max_message_len: usize,
    pub max_tags: usize,
    pub max_tag_len: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_bounty_amount: 1_000_000_000_000,
            max_title_len: 200,
            max_message_len: 2_000,
            max_tags: 10,
            max_tag_len: 40,
        }
    }
}

impl Config {
    /// Load from a path, falling back to the embedded defaults, then apply
    /// `BOUNTY_*` environment overrides
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let mut config: Config = if path.exists() {
            let content = std::fs::read_to_string(path).context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")?
        } else {
            // Use embedded default config
            toml::from_str(DEFAULT_CONFIG).context("Failed to parse default config")?
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Override settings from `lookup`: BOUNTY_DB_PATH, BOUNTY_HOST and
    /// BOUNTY_PORT. Empty values and unparsable ports are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("BOUNTY_DB_PATH").filter(|v| !v.is_empty()) {
            self.database.path = path;
        }
        if let Some(host) = lookup("BOUNTY_HOST").filter(|v| !v.is_empty()) {
            self.server.host = host;
        }
        if let Some(port) = lookup("BOUNTY_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
    }

    pub fn database_path(&self) -> String {
        self.database.path.clone()
    }

    pub fn host(&self) -> String {
        self.server.host.clone()
    }

    pub fn port(&self) -> u16 {
        self.server.port
    }
}

impl Default for Config {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG).unwrap_or_else(|_| Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            database: DatabaseConfig::default(),
            limits: Limits::default(),
        })
    }
}
