//! Errors returned by node clients.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("invalid node url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    #[error("transport error for {url}: {reason}")]
    Transport { url: String, reason: String },

    #[error("{url} responded {status}: {message}")]
    Api {
        url: String,
        status: u16,
        message: String,
    },

    #[error("failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),
}

impl NodeError {
    /// Whether the node reported that the task does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, NodeError::Api { status: 404, .. })
    }
}

pub type NodeResult<T> = Result<T, NodeError>;
