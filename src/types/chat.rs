use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Content prefix the server writes into tool results it backfilled for a
/// rejected tool call.
pub const DENIAL_MARKER: &str = "ERROR: User denied";

/// Display token substituted for non-text content parts.
pub const IMAGE_PLACEHOLDER: &str = "[image]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    Tool,
    System,
}

impl Role {
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value.trim().to_ascii_lowercase().as_str() {
            "user" => Self::User,
            "assistant" => Self::Assistant,
            "tool" => Self::Tool,
            "system" => Self::System,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
            Self::System => "system",
        }
    }
}

/// Server-side lifecycle of a single tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl ToolCallStatus {
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "pending" => Self::Pending,
            "approved" => Self::Approved,
            "rejected" | "denied" => Self::Rejected,
            "cancelled" => Self::Cancelled,
            _ => return None,
        })
    }
}

/// A tool invocation requested by the agent. `id` correlates the request with
/// its eventual result or denial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments_json: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ToolCallStatus>,
}

impl ToolCallRequest {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments_json: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments_json: arguments_json.into(),
            status: None,
        }
    }

    /// Structured arguments; falls back to the raw text when it is not JSON.
    pub fn arguments(&self) -> Value {
        if self.arguments_json.trim().is_empty() {
            return Value::Object(serde_json::Map::new());
        }
        serde_json::from_str(&self.arguments_json)
            .unwrap_or_else(|_| Value::String(self.arguments_json.clone()))
    }
}

/// How a tool-role message resolved its call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolOutcome {
    Result,
    Denied,
}

impl ToolOutcome {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "result" => Some(Self::Result),
            "denied" | "rejected" => Some(Self::Denied),
            _ => None,
        }
    }

    /// Fallback classification for servers that do not send `outcome`.
    pub fn sniff(content: &str) -> Self {
        if content.trim_start().starts_with(DENIAL_MARKER) {
            Self::Denied
        } else {
            Self::Result
        }
    }
}

/// One decoded chat message, stamped with its server-assigned ordinal.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatEvent {
    pub ordinal: u64,
    pub role: Role,
    pub content: String,
    pub tool_calls: Vec<ToolCallRequest>,
    pub tool_call_id: Option<String>,
    pub tool_name: Option<String>,
    pub arguments: Option<Value>,
    /// Explicit outcome when the server sends one.
    pub outcome: Option<ToolOutcome>,
    pub message_id: Option<String>,
    pub timestamp: Option<String>,
}

impl ChatEvent {
    pub fn new(ordinal: u64, role: Role, content: impl Into<String>) -> Self {
        Self {
            ordinal,
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            tool_name: None,
            arguments: None,
            outcome: None,
            message_id: None,
            timestamp: None,
        }
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCallRequest>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    pub fn with_tool_call_id(mut self, tool_call_id: impl Into<String>) -> Self {
        self.tool_call_id = Some(tool_call_id.into());
        self
    }

    pub fn with_outcome(mut self, outcome: ToolOutcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    /// Explicit outcome first, content sniffing otherwise.
    pub fn tool_outcome(&self) -> ToolOutcome {
        self.outcome
            .unwrap_or_else(|| ToolOutcome::sniff(&self.content))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoneStatus {
    Completed,
    Interrupted,
}

impl DoneStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            _ => None,
        }
    }
}

/// Typed sum over every named SSE event the chat stream emits.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Message(ChatEvent),
    /// The run is blocked until these calls are approved or denied.
    Ask { tool_calls: Vec<ToolCallRequest> },
    Done { status: DoneStatus },
    ServerError { message: String },
    /// Unrecognized event name whose payload was not a chat message.
    /// `ordinal` is set when the payload still carried a readable index.
    Passthrough {
        event: String,
        content: String,
        ordinal: Option<u64>,
    },
}

/// Row of the chat list endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSummary {
    pub chat_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub created_at: Option<Value>,
    #[serde(default)]
    pub updated_at: Option<Value>,
}

impl ChatSummary {
    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .unwrap_or("(untitled)")
    }

    pub fn display_updated_at(&self) -> String {
        match self.updated_at.as_ref().or(self.created_at.as_ref()) {
            Some(Value::String(text)) => text.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatDetail {
    pub chat_id: String,
    #[serde(default)]
    pub auto_approve: bool,
}

/// Read-only snapshot returned for a share id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedChat {
    pub chat_id: String,
    #[serde(default)]
    pub messages: Vec<Value>,
    #[serde(default)]
    pub create_time: Option<Value>,
    #[serde(default)]
    pub origin_chat_id: Option<String>,
    #[serde(default)]
    pub origin_message_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denial_sniff_requires_prefix() {
        assert_eq!(
            ToolOutcome::sniff("ERROR: User denied execution of bash"),
            ToolOutcome::Denied
        );
        assert_eq!(
            ToolOutcome::sniff("output mentions ERROR: User denied"),
            ToolOutcome::Result
        );
    }

    #[test]
    fn test_explicit_outcome_overrides_content() {
        let event = ChatEvent::new(3, Role::Tool, "ERROR: User denied x")
            .with_tool_call_id("t1")
            .with_outcome(ToolOutcome::Result);
        assert_eq!(event.tool_outcome(), ToolOutcome::Result);
    }

    #[test]
    fn test_tool_call_arguments_fall_back_to_raw_text() {
        let call = ToolCallRequest::new("t1", "bash", "not json");
        assert_eq!(call.arguments(), Value::String("not json".to_string()));

        let call = ToolCallRequest::new("t2", "bash", r#"{"command":"ls"}"#);
        assert_eq!(call.arguments()["command"], "ls");
    }

    #[test]
    fn test_chat_summary_title_fallback() {
        let summary: ChatSummary =
            serde_json::from_str(r#"{"chat_id":"c1","title":"  ","updated_at":1700}"#).unwrap();
        assert_eq!(summary.display_title(), "(untitled)");
        assert_eq!(summary.display_updated_at(), "1700");
    }
}
