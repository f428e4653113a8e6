//! Pure decoding of named SSE payloads into [`StreamEvent`]s.
//!
//! `message`, `text`, `tool_use` and `tool_result` share one envelope,
//! `{"index": N, "type": "message", "data": {...}}`. Names this client does
//! not know are decoded as a message when the payload looks like one and
//! passed through as text otherwise, so newer servers never break the stream.

use super::error::DecodeError;
use crate::types::{
    ChatEvent, DoneStatus, Role, StreamEvent, ToolCallRequest, ToolCallStatus, ToolOutcome,
    IMAGE_PLACEHOLDER,
};
use serde_json::Value;

const MESSAGE_EVENTS: [&str; 4] = ["message", "text", "tool_use", "tool_result"];

/// True for event names that always carry an ordinal-stamped envelope.
/// `ask`, `done` and `error` carry none.
pub fn is_message_event(event: &str) -> bool {
    MESSAGE_EVENTS.contains(&event)
}

pub fn decode_event(event: &str, payload: &str) -> Result<StreamEvent, DecodeError> {
    match event {
        name if is_message_event(name) => {
            decode_message(event, payload).map(StreamEvent::Message)
        }
        "ask" => decode_ask(event, payload),
        "done" => Ok(StreamEvent::Done {
            status: decode_done_status(payload),
        }),
        "error" => Ok(StreamEvent::ServerError {
            message: decode_error_message(payload),
        }),
        _ => match decode_message(event, payload) {
            Ok(message) => Ok(StreamEvent::Message(message)),
            Err(_) => Ok(StreamEvent::Passthrough {
                event: event.to_string(),
                content: passthrough_content(payload),
                ordinal: serde_json::from_str::<Value>(payload)
                    .ok()
                    .and_then(|value| read_ordinal(&value)),
            }),
        },
    }
}

pub fn decode_message(event: &str, payload: &str) -> Result<ChatEvent, DecodeError> {
    let value: Value = parse_json(event, payload)?;
    let ordinal = read_ordinal(&value);
    let message = value
        .get("data")
        .filter(|data| data.is_object())
        .unwrap_or(&value);

    let Some(ordinal) = ordinal else {
        return Err(DecodeError::MissingField {
            event: event.to_string(),
            field: "index",
            ordinal: None,
        });
    };

    decode_message_object(event, ordinal, message)
}

/// Decodes a bare message object (no envelope) at a caller-chosen ordinal.
pub fn decode_message_object(
    event: &str,
    ordinal: u64,
    message: &Value,
) -> Result<ChatEvent, DecodeError> {
    let missing = |field| DecodeError::MissingField {
        event: event.to_string(),
        field,
        ordinal: Some(ordinal),
    };
    let invalid = |field, detail: String| DecodeError::InvalidField {
        event: event.to_string(),
        field,
        detail,
        ordinal: Some(ordinal),
    };

    let role_text = message
        .get("role")
        .and_then(Value::as_str)
        .ok_or_else(|| missing("role"))?;
    let role = Role::parse(role_text).ok_or_else(|| invalid("role", role_text.to_string()))?;

    let content = message.get("content").ok_or_else(|| missing("content"))?;
    let content = flatten_content(content).map_err(|detail| invalid("content", detail))?;

    let tool_calls = match message.get("tool_calls") {
        None | Some(Value::Null) => Vec::new(),
        Some(value) => decode_tool_calls(value).map_err(|detail| invalid("tool_calls", detail))?,
    };

    let outcome = match message.get("outcome").and_then(Value::as_str) {
        Some(text) => {
            Some(ToolOutcome::parse(text).ok_or_else(|| invalid("outcome", text.to_string()))?)
        }
        None => None,
    };

    Ok(ChatEvent {
        ordinal,
        role,
        content,
        tool_calls,
        tool_call_id: string_field(message, "tool_call_id"),
        tool_name: string_field(message, "tool").or_else(|| string_field(message, "name")),
        arguments: message
            .get("arguments")
            .filter(|arguments| !arguments.is_null())
            .cloned(),
        outcome,
        message_id: string_field(message, "id"),
        timestamp: string_field(message, "timestamp"),
    })
}

/// Flattens string or part-list content into one display string.
pub fn flatten_content(content: &Value) -> Result<String, String> {
    match content {
        Value::Null => Ok(String::new()),
        Value::String(text) => Ok(text.clone()),
        Value::Array(parts) => {
            let mut out = String::new();
            for part in parts {
                append_part(&mut out, part);
            }
            Ok(out)
        }
        Value::Object(_) => {
            let mut out = String::new();
            append_part(&mut out, content);
            Ok(out)
        }
        other => Err(format!("expected string or parts, got {}", value_type_name(other))),
    }
}

fn append_part(out: &mut String, part: &Value) {
    match part {
        Value::String(text) => out.push_str(text),
        Value::Object(fields) => {
            let part_type = fields.get("type").and_then(Value::as_str).unwrap_or("text");
            if part_type.starts_with("image") {
                out.push_str(IMAGE_PLACEHOLDER);
            } else if let Some(text) = fields.get("text").and_then(Value::as_str) {
                out.push_str(text);
            }
        }
        _ => {}
    }
}

pub fn decode_tool_calls(value: &Value) -> Result<Vec<ToolCallRequest>, String> {
    let Some(items) = value.as_array() else {
        return Err(format!("expected array, got {}", value_type_name(value)));
    };
    items
        .iter()
        .enumerate()
        .map(|(position, item)| {
            decode_tool_call(item).ok_or_else(|| format!("tool call #{position} has no id"))
        })
        .collect()
}

fn decode_tool_call(value: &Value) -> Option<ToolCallRequest> {
    let id = value.get("id").and_then(Value::as_str)?.to_string();
    let function = value.get("function");
    let name = value
        .get("name")
        .or_else(|| function.and_then(|function| function.get("name")))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let arguments_json = match value
        .get("arguments")
        .or_else(|| function.and_then(|function| function.get("arguments")))
    {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    };
    let status = value
        .get("status")
        .and_then(Value::as_str)
        .and_then(ToolCallStatus::parse);

    Some(ToolCallRequest {
        id,
        name,
        arguments_json,
        status,
    })
}

fn decode_ask(event: &str, payload: &str) -> Result<StreamEvent, DecodeError> {
    let value = parse_json(event, payload)?;
    let calls = value
        .get("tool_calls")
        .ok_or_else(|| DecodeError::MissingField {
            event: event.to_string(),
            field: "tool_calls",
            ordinal: None,
        })?;
    let tool_calls = decode_tool_calls(calls).map_err(|detail| DecodeError::InvalidField {
        event: event.to_string(),
        field: "tool_calls",
        detail,
        ordinal: None,
    })?;
    Ok(StreamEvent::Ask { tool_calls })
}

fn decode_done_status(payload: &str) -> DoneStatus {
    serde_json::from_str::<Value>(payload)
        .ok()
        .and_then(|value| {
            value
                .get("status")
                .and_then(Value::as_str)
                .and_then(DoneStatus::parse)
        })
        .unwrap_or(DoneStatus::Completed)
}

fn decode_error_message(payload: &str) -> String {
    match serde_json::from_str::<Value>(payload) {
        Ok(value) => value
            .get("error")
            .or_else(|| value.get("message"))
            .or_else(|| value.get("detail"))
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .unwrap_or_else(|| payload.trim().to_string()),
        Err(_) => payload.trim().to_string(),
    }
}

fn passthrough_content(payload: &str) -> String {
    serde_json::from_str::<Value>(payload)
        .ok()
        .and_then(|value| {
            value
                .get("content")
                .and_then(|content| flatten_content(content).ok())
        })
        .unwrap_or_else(|| payload.trim().to_string())
}

fn parse_json(event: &str, payload: &str) -> Result<Value, DecodeError> {
    serde_json::from_str(payload).map_err(|source| DecodeError::MalformedJson {
        event: event.to_string(),
        source,
    })
}

fn read_ordinal(value: &Value) -> Option<u64> {
    value
        .get("index")
        .or_else(|| value.get("ordinal"))
        .and_then(Value::as_u64)
}

fn string_field(value: &Value, field: &str) -> Option<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
