//! Error types for the verse search client

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Download error: {0}")]
    Download(String),

    #[error("Engine init error: {0}")]
    EngineInit(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Download cancelled")]
    Cancelled,

    #[error("Config error: {0}")]
    Config(String),

    #[error("Not ready: {0}")]
    NotReady(String),

    #[error("{0}")]
    Other(String),
}

impl serde::Serialize for ClientError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        ClientError::Network(e.to_string())
    }
}

impl From<prost::DecodeError> for ClientError {
    fn from(e: prost::DecodeError) -> Self {
        ClientError::Decode(e.to_string())
    }
}

/// Failures raised by a key-value backend
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Entry {key} is {size} bytes, backend limit is {limit}")]
    EntryTooLarge { key: String, size: usize, limit: usize },

    #[error("Corrupt entry: {0}")]
    Corrupt(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Task join error: {0}")]
    Join(String),
}
