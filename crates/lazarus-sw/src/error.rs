use lazarus_common::LazarusError;
use lazarus_net::NetError;
use thiserror::Error;

/// Errors that can occur in offline agent operations.
#[derive(Error, Debug)]
pub enum AgentError {
    /// A precache URL could not be fetched or returned a non-success status.
    #[error("Precache failed for {url}: {reason}")]
    Precache { url: String, reason: String },

    #[error("Network error: {0}")]
    Network(#[from] NetError),

    /// Offline navigation and the fallback document is not cached.
    #[error("No cached fallback at {url}")]
    NoFallback {
        url: String,
        #[source]
        source: NetError,
    },

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Storage IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error(transparent)]
    Config(#[from] LazarusError),

    #[error("State error: {0}")]
    State(String),
}

impl AgentError {
    pub fn cache(msg: impl Into<String>) -> Self {
        Self::Cache(msg.into())
    }

    /// Whether the failure came from the network rather than the agent or
    /// its cache storage.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            AgentError::Network(_) | AgentError::NoFallback { .. } | AgentError::Precache { .. }
        )
    }
}
