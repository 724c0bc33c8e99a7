//! Client configuration

use crate::error::ClientError;
use crate::store::chunked::CHUNK_SIZE;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_API_URL: &str = "https://api.instant.bible";
const DEFAULT_INDEX_URL: &str = "https://instant.bible/index.pb";
const DEFAULT_INDEX_KEY: &str = "indexBytes";

/// Environment variable overriding `api_url`
pub const API_URL_ENV: &str = "IB_API";
/// Environment variable overriding `index_url`
pub const INDEX_URL_ENV: &str = "IB_INDEX_URL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Remote search endpoint, queried as `GET {api_url}?q=<query>`
    pub api_url: String,
    /// Location of the search index blob
    pub index_url: String,
    /// Key the index blob is persisted under
    pub index_key: String,
    /// Expected hex SHA-256 of the index blob, checked after download
    pub index_sha256: Option<String>,
    pub request_timeout_secs: u64,
    pub download_timeout_secs: u64,
    /// Directory holding the SQLite key-value file
    pub data_dir: PathBuf,
    /// Per-entry ceiling enforced by the built-in stores
    pub max_entry_bytes: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            index_url: DEFAULT_INDEX_URL.to_string(),
            index_key: DEFAULT_INDEX_KEY.to_string(),
            index_sha256: None,
            request_timeout_secs: 30,
            download_timeout_secs: 300,
            data_dir: default_data_dir(),
            max_entry_bytes: CHUNK_SIZE,
        }
    }
}

/// Platform data directory for the client
///
/// - macOS: ~/Library/Application Support/versearch/
/// - Linux: $XDG_DATA_HOME/versearch/
/// - Windows: %APPDATA%\versearch\
/// - Fallback: ./data
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("versearch"))
        .unwrap_or_else(|| PathBuf::from("data"))
}

impl ClientConfig {
    /// Load config from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ClientError> {
        let content = fs::read_to_string(path)
            .map_err(|e| ClientError::Config(format!("Failed to read {:?}: {}", path, e)))?;
        let config: ClientConfig = serde_json::from_str(&content)
            .map_err(|e| ClientError::Config(format!("Failed to parse {:?}: {}", path, e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `IB_API` / `IB_INDEX_URL` overrides from the process environment
    pub fn apply_env_overrides(mut self) -> Self {
        self.apply_overrides(|name| std::env::var(name).ok());
        self
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(API_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.api_url = url;
        }
        if let Some(url) = lookup(INDEX_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.index_url = url;
        }
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        if self.api_url.trim().is_empty() {
            return Err(ClientError::Config("api_url is empty".to_string()));
        }
        if self.index_url.trim().is_empty() {
            return Err(ClientError::Config("index_url is empty".to_string()));
        }
        if self.index_key.is_empty() {
            return Err(ClientError::Config("index_key is empty".to_string()));
        }
        if self.max_entry_bytes == 0 {
            return Err(ClientError::Config("max_entry_bytes must be positive".to_string()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    /// Path of the SQLite key-value file inside `data_dir`
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("keyval.db")
    }
}
