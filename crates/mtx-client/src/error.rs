use mtx_core::{ErrorCategory, RequestError};
use thiserror::Error;

use crate::transport::TransportError;

/// Failures of the client facade that are not plain request failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("invalid homeserver url '{url}': {reason}")]
    InvalidHomeserver { url: String, reason: String },
    #[error("http transport could not be built: {0}")]
    Transport(#[from] TransportError),
    #[error("no access token; log in or restore a session first")]
    NotLoggedIn,
    #[error("sync task is already running")]
    SyncAlreadyRunning,
    #[error("sync task is not running")]
    SyncNotRunning,
    #[error("sync task failed: {0}")]
    SyncTaskFailed(String),
    #[error(transparent)]
    Request(#[from] RequestError),
}

impl ClientError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidHomeserver { .. } => "invalid_homeserver",
            Self::Transport(_) => "transport_build_failed",
            Self::NotLoggedIn => "not_logged_in",
            Self::SyncAlreadyRunning => "sync_already_running",
            Self::SyncNotRunning => "sync_not_running",
            Self::SyncTaskFailed(_) => "sync_task_failed",
            Self::Request(_) => "request_failed",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidHomeserver { .. } => ErrorCategory::Config,
            Self::Transport(_) => ErrorCategory::Internal,
            Self::NotLoggedIn => ErrorCategory::Auth,
            Self::SyncAlreadyRunning | Self::SyncNotRunning | Self::SyncTaskFailed(_) => {
                ErrorCategory::Internal
            }
            Self::Request(err) => err.category(),
        }
    }
}
