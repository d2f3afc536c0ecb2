//! Error types for the synchronization engine.

use issuedesk_core::{AppError, DatabaseError, NetworkError};
use thiserror::Error;

/// HTTP statuses the tracker uses for optimistic-concurrency rejections.
pub const CONFLICT_STATUSES: [u16; 2] = [409, 412];

/// Failures of queued work and remote calls.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Network or decode failure before a usable response was obtained.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The tracker answered with a non-2xx status.
    #[error("Remote rejected request ({status}): {message}")]
    Remote { status: u16, message: String },

    /// The debug kill switch is on; the operation was never started.
    #[error("Syncing is disabled")]
    SyncingDisabled,

    /// `enqueue` was called outside a Tokio runtime.
    #[error("Sync runtime not available")]
    RuntimeUnavailable,

    /// The operation panicked or its task was torn down.
    #[error("Operation aborted: {0}")]
    Aborted(String),

    #[error("Cache error: {0}")]
    Cache(#[from] DatabaseError),

    #[error("Draft ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SyncError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn remote(status: u16, message: impl Into<String>) -> Self {
        Self::Remote {
            status,
            message: message.into(),
        }
    }

    /// HTTP status carried by the error, if the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Remote { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True for an optimistic-concurrency rejection (409 or 412).
    pub fn is_conflict(&self) -> bool {
        self.status()
            .map(|status| CONFLICT_STATUSES.contains(&status))
            .unwrap_or(false)
    }

    /// User-friendly message for UI display.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Transport(_) => "Unable to reach the tracker. Check your connection.",
            Self::Remote { .. } if self.is_conflict() => {
                "This item changed on the server. Refresh and reapply your edit."
            }
            Self::Remote { status, .. } if *status >= 500 => {
                "The tracker is experiencing issues. Please try again later."
            }
            Self::Remote { .. } => "The tracker rejected the request.",
            Self::SyncingDisabled => "Syncing is turned off.",
            Self::RuntimeUnavailable => "Sync service not initialized.",
            Self::Aborted(_) => "The operation stopped unexpectedly. Please try again.",
            Self::Cache(e) => e.user_message(),
            Self::Ledger(_) => "Failed to save your draft locally.",
            Self::Other(_) => "Something went wrong. Please try again.",
        }
    }
}

impl From<NetworkError> for SyncError {
    fn from(err: NetworkError) -> Self {
        match err {
            NetworkError::ServerError { status, message } => Self::Remote { status, message },
            other => Self::Transport(other.to_string()),
        }
    }
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Transport(message) => {
                AppError::Network(NetworkError::ConnectionFailed(message))
            }
            SyncError::Remote { status, message } => {
                AppError::Network(NetworkError::ServerError { status, message })
            }
            SyncError::Cache(e) => AppError::Database(e),
            SyncError::Other(e) => AppError::Other(e),
            other => AppError::Sync(other.to_string()),
        }
    }
}

/// Result alias for engine operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Durable storage failures of the draft ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Draft storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Draft storage is unreadable: {0}")]
    Serialization(#[from] serde_json::Error),
}
