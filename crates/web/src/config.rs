use std::fs;
use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use repertoire_core::PracticeConfig;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default)]
    pub practice: PracticeConfig,
}

fn default_bind_addr() -> String {
    "127.0.0.1:3000".to_string()
}
fn default_database_path() -> String {
    data_dir().join("repertoire.db").to_string_lossy().to_string()
}

/// `REPERTOIRE_DATA_DIR`, else the platform data dir, else `./data`.
fn data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("REPERTOIRE_DATA_DIR") {
        return PathBuf::from(dir);
    }
    dirs::data_dir()
        .map(|d| d.join("repertoire"))
        .unwrap_or_else(|| PathBuf::from("data"))
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            database_path: default_database_path(),
            practice: PracticeConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Reads `REPERTOIRE_CONFIG` (or `repertoire.toml`) when it exists.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        if path.exists() {
            let content = fs::read_to_string(&path)?;
            Self::from_toml(&content)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn config_path() -> PathBuf {
        std::env::var_os("REPERTOIRE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("repertoire.toml"))
    }
}
