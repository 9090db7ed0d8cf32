//! Error types for quota-relay

use crate::completion::CompletionError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Quota store unavailable: {0}")]
    StoreUnavailable(#[from] rusqlite::Error),

    #[error("Quota store lock poisoned")]
    StoreLockPoisoned,

    #[error("Quota store task failed: {0}")]
    StoreTask(#[from] tokio::task::JoinError),

    #[error("Completion failed: {0}")]
    Completion(#[from] CompletionError),

    #[error("Redemption failed: {0}")]
    Redemption(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Config encode error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
