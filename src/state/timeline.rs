use crate::api::decode::decode_message_object;
use crate::types::{ChatEvent, Role, ToolOutcome};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    User,
    Assistant,
    /// Requested tool call with no result yet.
    ToolPending,
    ToolResult,
    ToolDenied,
    System,
}

impl EntryKind {
    pub fn is_tool(&self) -> bool {
        matches!(self, Self::ToolPending | Self::ToolResult | Self::ToolDenied)
    }
}

/// Rendered unit of a chat transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub kind: EntryKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Ordinal of the event that last wrote this entry; `None` for local notices.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ordinal: Option<u64>,
}

impl TimelineEntry {
    fn from_event(kind: EntryKind, event: &ChatEvent) -> Self {
        Self {
            kind,
            content: event.content.clone(),
            tool_name: None,
            arguments: None,
            correlation_id: None,
            timestamp: event.timestamp.clone(),
            ordinal: Some(event.ordinal),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            kind: EntryKind::System,
            content: content.into(),
            tool_name: None,
            arguments: None,
            correlation_id: None,
            timestamp: None,
            ordinal: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TimelineUpdate {
    Appended { index: usize, entry: TimelineEntry },
    /// A pending tool entry was rewritten in place to its outcome.
    Resolved { index: usize, entry: TimelineEntry },
}

/// Ordered transcript folded from chat events.
///
/// Safe under at-least-once delivery: an ordinal is applied once, and a
/// correlation id is resolved at most once.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    entries: Vec<TimelineEntry>,
    applied_ordinals: BTreeSet<u64>,
    by_correlation: HashMap<String, usize>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_events<'a>(events: impl IntoIterator<Item = &'a ChatEvent>) -> Self {
        let mut timeline = Self::new();
        for event in events {
            timeline.apply(event);
        }
        timeline
    }

    /// Folds stored messages (no envelopes), using each position as its
    /// ordinal. Returns the timeline and how many messages were skipped.
    pub fn from_snapshot(messages: &[Value]) -> (Self, usize) {
        let mut timeline = Self::new();
        let mut skipped = 0;
        for (position, message) in messages.iter().enumerate() {
            match decode_message_object("snapshot", position as u64, message) {
                Ok(event) => {
                    timeline.apply(&event);
                }
                Err(error) => {
                    tracing::debug!(position, "skipping snapshot message: {error}");
                    skipped += 1;
                }
            }
        }
        (timeline, skipped)
    }

    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry_for(&self, correlation_id: &str) -> Option<&TimelineEntry> {
        self.by_correlation
            .get(correlation_id)
            .and_then(|index| self.entries.get(*index))
    }

    pub fn pending_entries(&self) -> impl Iterator<Item = &TimelineEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.kind == EntryKind::ToolPending)
    }

    pub fn has_applied(&self, ordinal: u64) -> bool {
        self.applied_ordinals.contains(&ordinal)
    }

    pub fn apply(&mut self, event: &ChatEvent) -> Vec<TimelineUpdate> {
        if !self.applied_ordinals.insert(event.ordinal) {
            return Vec::new();
        }

        match event.role {
            Role::User => vec![self.append(TimelineEntry::from_event(EntryKind::User, event))],
            Role::System => vec![self.append(TimelineEntry::from_event(EntryKind::System, event))],
            Role::Assistant => self.apply_assistant(event),
            Role::Tool => self.apply_tool(event).into_iter().collect(),
        }
    }

    /// Appends a local notice that did not come from an ordinal-stamped event.
    pub fn push_system(&mut self, content: impl Into<String>) -> TimelineUpdate {
        self.append(TimelineEntry::system(content))
    }

    fn apply_assistant(&mut self, event: &ChatEvent) -> Vec<TimelineUpdate> {
        let mut updates = Vec::new();
        if !event.content.trim().is_empty() {
            updates.push(self.append(TimelineEntry::from_event(EntryKind::Assistant, event)));
        }

        for call in &event.tool_calls {
            if self.by_correlation.contains_key(&call.id) {
                continue;
            }
            let mut entry = TimelineEntry::from_event(EntryKind::ToolPending, event);
            entry.content = String::new();
            entry.tool_name = Some(call.name.clone());
            entry.arguments = Some(call.arguments());
            entry.correlation_id = Some(call.id.clone());
            let update = self.append(entry);
            if let TimelineUpdate::Appended { index, .. } = &update {
                self.by_correlation.insert(call.id.clone(), *index);
            }
            updates.push(update);
        }

        updates
    }

    fn apply_tool(&mut self, event: &ChatEvent) -> Option<TimelineUpdate> {
        let kind = match event.tool_outcome() {
            ToolOutcome::Result => EntryKind::ToolResult,
            ToolOutcome::Denied => EntryKind::ToolDenied,
        };

        let existing = event
            .tool_call_id
            .as_ref()
            .and_then(|id| self.by_correlation.get(id).copied());

        if let Some(index) = existing {
            let entry = &mut self.entries[index];
            if entry.kind != EntryKind::ToolPending {
                return None;
            }
            entry.kind = kind;
            entry.content = event.content.clone();
            entry.ordinal = Some(event.ordinal);
            if event.timestamp.is_some() {
                entry.timestamp = event.timestamp.clone();
            }
            if entry.tool_name.is_none() {
                entry.tool_name = event.tool_name.clone();
            }
            return Some(TimelineUpdate::Resolved {
                index,
                entry: entry.clone(),
            });
        }

        let mut entry = TimelineEntry::from_event(kind, event);
        entry.tool_name = event.tool_name.clone();
        entry.arguments = event.arguments.clone();
        entry.correlation_id = event.tool_call_id.clone();
        let update = self.append(entry);
        if let (Some(id), TimelineUpdate::Appended { index, .. }) = (&event.tool_call_id, &update) {
            self.by_correlation.insert(id.clone(), *index);
        }
        Some(update)
    }

    fn append(&mut self, entry: TimelineEntry) -> TimelineUpdate {
        let index = self.entries.len();
        self.entries.push(entry.clone());
        TimelineUpdate::Appended { index, entry }
    }
}
