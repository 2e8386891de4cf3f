use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::bus;

/// Where the remote store lives and how the local bus is sized.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    pub database_url: String,
    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,
}

fn default_bus_capacity() -> usize {
    bus::DEFAULT_CAPACITY
}

// ---------------------------------------------------------------------------
// File paths
// ---------------------------------------------------------------------------

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("neverlight-mail")
}

fn config_path() -> PathBuf {
    config_dir().join("remote.json")
}

// ---------------------------------------------------------------------------
// Resolution: env vars, then config file
// ---------------------------------------------------------------------------

impl StoreConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        StoreConfig {
            database_url: normalize_url(&database_url.into()),
            bus_capacity: default_bus_capacity(),
        }
    }

    /// Try env vars. Returns None if the database URL is missing.
    fn from_env() -> Option<Self> {
        let database_url = std::env::var("NEVERLIGHT_MAIL_DATABASE_URL").ok()?;
        let bus_capacity = std::env::var("NEVERLIGHT_MAIL_BUS_CAPACITY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_bus_capacity);
        Some(StoreConfig {
            database_url: normalize_url(&database_url),
            bus_capacity,
        })
    }

    /// Env vars first, then the config file. `Ok(None)` when neither exists.
    pub fn resolve() -> Result<Option<Self>, String> {
        if let Some(config) = Self::from_env() {
            log::info!("Store config loaded from environment variables");
            return Ok(Some(config));
        }
        Self::load_from(&config_path())
    }

    fn load_from(path: &std::path::Path) -> Result<Option<Self>, String> {
        if !path.exists() {
            log::info!("No store config file at {}", path.display());
            return Ok(None);
        }
        let data = fs::read_to_string(path).map_err(|e| format!("read config: {e}"))?;
        let mut config: StoreConfig =
            serde_json::from_str(&data).map_err(|e| format!("parse config: {e}"))?;
        config.database_url = normalize_url(&config.database_url);
        if config.database_url.is_empty() {
            return Err("config has an empty database_url".into());
        }
        Ok(Some(config))
    }

    pub fn save(&self) -> Result<(), String> {
        self.save_to(&config_path())
    }

    fn save_to(&self, path: &std::path::Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| format!("create config dir: {e}"))?;
        }
        let data =
            serde_json::to_string_pretty(self).map_err(|e| format!("serialize config: {e}"))?;
        fs::write(path, data).map_err(|e| format!("write config: {e}"))
    }
}

fn normalize_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}
