use crate::state::TimelineUpdate;
use crate::types::{DoneStatus, ToolCallRequest};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    Idle,
    Connecting,
    Streaming,
    AwaitingApproval,
    Completed,
    Closed,
}

impl StreamPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Streaming => "streaming",
            Self::AwaitingApproval => "awaiting_approval",
            Self::Completed => "completed",
            Self::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Open,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStreamState {
    pub chat_id: String,
    /// Resume cursor: one past the highest ordinal consumed so far.
    pub last_consumed_ordinal: u64,
    pub connection_status: ConnectionStatus,
    pub terminal: bool,
}

impl SessionStreamState {
    pub fn new(chat_id: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            last_consumed_ordinal: 0,
            connection_status: ConnectionStatus::Closed,
            terminal: false,
        }
    }
}

/// Everything a front-end needs to render a session, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    Phase(StreamPhase),
    Timeline(TimelineUpdate),
    ApprovalRequested(Vec<ToolCallRequest>),
    ApprovalsSubmitted,
    Completed(DoneStatus),
    /// The chat list may have changed (a run finished or was stopped).
    ChatListStale,
    AutoApprove(bool),
    ServerError(String),
    /// The stream dropped before a terminal event; `reconnect` resumes it.
    TransportLost(String),
    LoggedOut,
}

pub(crate) fn emit_session_update(
    updates: Option<&mpsc::UnboundedSender<SessionUpdate>>,
    update: SessionUpdate,
) {
    if let Some(tx) = updates {
        let _ = tx.send(update);
    }
}
