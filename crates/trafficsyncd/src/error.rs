//! Error types for trafficsyncd

use thiserror::Error;
use traffic_accounting::AccountingError;

/// Traffic synchronization daemon errors
#[derive(Error, Debug)]
pub enum SyncError {
    /// Accounting store or key error
    #[error(transparent)]
    Accounting(#[from] AccountingError),

    /// The node counter agent could not be reached or failed the call
    #[error("Counter source on {node} unavailable: {message}")]
    RemoteUnavailable {
        /// Node address the agent runs on.
        node: String,
        /// Error message.
        message: String,
    },

    /// Reading or updating the tracked resource failed
    #[error("Lifecycle error for {resource}: {message}")]
    Lifecycle {
        /// Resource name (`namespace/name`).
        resource: String,
        /// Error message.
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file parse error
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl SyncError {
    /// Creates a remote unavailable error.
    pub fn remote_unavailable(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RemoteUnavailable {
            node: node.into(),
            message: message.into(),
        }
    }

    /// Creates a lifecycle error.
    pub fn lifecycle(resource: impl ToString, message: impl Into<String>) -> Self {
        Self::Lifecycle {
            resource: resource.to_string(),
            message: message.into(),
        }
    }

    /// Returns true if the failed reconcile should be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Accounting(e) => e.is_retryable(),
            SyncError::RemoteUnavailable { .. } | SyncError::Lifecycle { .. } => true,
            SyncError::Configuration(_) | SyncError::Io(_) | SyncError::Toml(_) => false,
        }
    }
}

/// Result type for trafficsyncd operations
pub type Result<T> = std::result::Result<T, SyncError>;
