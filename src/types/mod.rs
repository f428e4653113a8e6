mod chat;

pub use chat::{
    ChatDetail, ChatEvent, ChatSummary, DoneStatus, Role, SharedChat, StreamEvent,
    ToolCallRequest, ToolCallStatus, ToolOutcome, DENIAL_MARKER, IMAGE_PLACEHOLDER,
};
