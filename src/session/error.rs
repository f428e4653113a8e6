use crate::api::ApiError;
use crate::state::ApprovalError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Approval(#[from] ApprovalError),
    #[error("tool calls are awaiting a decision; submit decisions before sending a message")]
    AwaitingApproval,
    #[error("session for chat '{0}' is closed")]
    Closed(String),
    #[error("message is empty")]
    EmptyMessage,
}

impl SessionError {
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Api(error) if error.is_auth())
    }
}
