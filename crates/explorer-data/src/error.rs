//! Fetch-stage error kinds.

use std::time::Duration;

/// Failure of a batched RPC fetch. Every variant is fatal to the job that
/// issued the batch.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Network-level failure (connection, HTTP status, unreadable body).
    #[error("transport error: {0}")]
    Transport(String),

    #[error("batch of {calls} calls timed out after {timeout:?}")]
    Timeout { calls: usize, timeout: Duration },

    /// Node-side error reported for a single call of a batch.
    #[error("rpc error on {method} (code {code}): {message}")]
    Rpc {
        method: String,
        code: i64,
        message: String,
    },

    /// Node answered `null`, e.g. a block past the chain head.
    #[error("{method} returned no result for {params}")]
    MissingResult { method: String, params: String },

    #[error("failed to deserialize {method} result: {source}")]
    Deserialize {
        method: String,
        #[source]
        source: serde_json::Error,
    },

    /// Response does not line up with the request that produced it.
    #[error("inconsistent response: {0}")]
    Inconsistent(String),

    #[error("fetch cancelled")]
    Cancelled,
}

impl FetchError {
    /// Network or timeout failures, the only kinds worth retrying.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout { .. })
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
