//! Error taxonomy for the harvester.
//!
//! Only [`HarvestError::Configuration`] is meant to unwind a whole run. Provider
//! and unknown-card errors are caught at the task or record boundary and turned
//! into counters; checkpoint corruption degrades to an empty result set.

use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, HarvestError>;

#[derive(Debug, Error)]
pub enum HarvestError {
    /// Fatal at startup, nothing has been fetched yet.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("checkpoint {path} is corrupt: {message}")]
    CheckpointCorruption { path: String, message: String },

    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl HarvestError {
    pub fn config(message: impl Into<String>) -> Self {
        HarvestError::Configuration(message.into())
    }
}

/// Failure of one remote lookup. Recoverable by excluding the identifier.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("unauthorized (status {status})")]
    Unauthorized { status: u16 },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limited")]
    RateLimited,

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("worker task aborted: {0}")]
    Aborted(String),
}

impl ProviderError {
    /// Whether another attempt has a chance of succeeding.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Transport(_)
            | ProviderError::RateLimited
            | ProviderError::Timeout(_) => true,
            ProviderError::Status { status, .. } => *status >= 500,
            ProviderError::Unauthorized { .. }
            | ProviderError::NotFound(_)
            | ProviderError::Decode(_)
            | ProviderError::Aborted(_) => false,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::Decode(err.to_string())
        } else {
            ProviderError::Transport(err.to_string())
        }
    }
}

/// A card name in a battle that the card index cannot resolve.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown card {name:?}")]
pub struct UnknownCardError {
    pub name: String,
}
