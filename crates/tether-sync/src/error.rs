use tether_client::ApiError;
use tether_core::enums::AgentStatus;
use tether_core::errors::CoreError;
use thiserror::Error;

/// Errors returned to callers of a sync session.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Invalid(#[from] CoreError),

    #[error("agent {id} is {status} and cannot take a follow-up")]
    FollowUpRejected { id: String, status: AgentStatus },

    #[error("sync session has ended")]
    SessionClosed,

    #[error("sync task failed: {0}")]
    Join(String),
}
