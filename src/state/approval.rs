use crate::api::DecisionBatch;
use crate::types::ToolCallRequest;
use std::collections::{BTreeMap, HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApprovalError {
    #[error("no tool calls are awaiting a decision")]
    NotAwaiting,
    #[error("tool call '{0}' is not awaiting a decision")]
    UnknownTool(String),
    #[error("a decision submission is already in flight")]
    InFlight,
}

/// Collects approve/deny choices for the tool calls of one `ask` event.
///
/// Decisions survive a failed submission so the user can retry; they are
/// cleared only by `finish_submit(true)`.
#[derive(Debug, Clone, Default)]
pub struct ApprovalCoordinator {
    chat_id: String,
    pending: Vec<ToolCallRequest>,
    decisions: HashMap<String, bool>,
    in_flight: bool,
}

impl ApprovalCoordinator {
    pub fn new(chat_id: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            ..Self::default()
        }
    }

    pub fn is_awaiting(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn pending(&self) -> &[ToolCallRequest] {
        &self.pending
    }

    pub fn decision(&self, tool_id: &str) -> Option<bool> {
        self.decisions.get(tool_id).copied()
    }

    pub fn undecided(&self) -> impl Iterator<Item = &ToolCallRequest> {
        self.pending
            .iter()
            .filter(|call| !self.decisions.contains_key(&call.id))
    }

    /// Replaces the pending set. Earlier choices for ids that are still
    /// pending are kept, which matters when an `ask` is replayed on reconnect.
    pub fn activate(&mut self, calls: Vec<ToolCallRequest>) {
        let mut seen = HashSet::new();
        self.pending = calls
            .into_iter()
            .filter(|call| seen.insert(call.id.clone()))
            .collect();
        let pending = &self.pending;
        self.decisions
            .retain(|id, _| pending.iter().any(|call| &call.id == id));
    }

    pub fn decide(&mut self, tool_id: &str, approved: bool) -> Result<(), ApprovalError> {
        if self.in_flight {
            return Err(ApprovalError::InFlight);
        }
        if !self.is_awaiting() {
            return Err(ApprovalError::NotAwaiting);
        }
        if !self.pending.iter().any(|call| call.id == tool_id) {
            return Err(ApprovalError::UnknownTool(tool_id.to_string()));
        }
        self.decisions.insert(tool_id.to_string(), approved);
        Ok(())
    }

    pub fn decide_all(&mut self, approved: bool) -> Result<(), ApprovalError> {
        if self.in_flight {
            return Err(ApprovalError::InFlight);
        }
        if !self.is_awaiting() {
            return Err(ApprovalError::NotAwaiting);
        }
        for call in &self.pending {
            self.decisions.insert(call.id.clone(), approved);
        }
        Ok(())
    }

    /// Builds the request body and marks a submission in flight.
    /// Undecided calls are sent as denied.
    pub fn begin_submit(
        &mut self,
        deny_message: Option<&str>,
    ) -> Result<DecisionBatch, ApprovalError> {
        if self.in_flight {
            return Err(ApprovalError::InFlight);
        }
        if !self.is_awaiting() {
            return Err(ApprovalError::NotAwaiting);
        }

        let decisions: BTreeMap<String, bool> = self
            .pending
            .iter()
            .map(|call| {
                let approved = self.decisions.get(&call.id).copied().unwrap_or(false);
                (call.id.clone(), approved)
            })
            .collect();
        let user_message = deny_message
            .map(str::trim)
            .filter(|message| !message.is_empty())
            .map(ToString::to_string);

        self.in_flight = true;
        Ok(DecisionBatch {
            chat_id: self.chat_id.clone(),
            decisions,
            user_message,
        })
    }

    pub fn finish_submit(&mut self, succeeded: bool) {
        self.in_flight = false;
        if succeeded {
            self.clear();
        }
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.decisions.clear();
        self.in_flight = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calls() -> Vec<ToolCallRequest> {
        vec![
            ToolCallRequest::new("t1", "bash", r#"{"command":"ls"}"#),
            ToolCallRequest::new("t2", "file_write", r#"{"path":"a.txt"}"#),
        ]
    }

    #[test]
    fn test_undecided_calls_are_submitted_as_denied() {
        let mut approvals = ApprovalCoordinator::new("c1");
        approvals.activate(calls());
        approvals.decide("t1", true).unwrap();

        let batch = approvals.begin_submit(None).unwrap();
        assert_eq!(batch.chat_id, "c1");
        assert_eq!(batch.decisions.get("t1"), Some(&true));
        assert_eq!(batch.decisions.get("t2"), Some(&false));
        assert!(batch.user_message.is_none());
    }

    #[test]
    fn test_decide_rejects_unknown_ids_and_idle_state() {
        let mut approvals = ApprovalCoordinator::new("c1");
        assert_eq!(approvals.decide("t1", true), Err(ApprovalError::NotAwaiting));

        approvals.activate(calls());
        assert_eq!(
            approvals.decide("t9", true),
            Err(ApprovalError::UnknownTool("t9".to_string()))
        );
    }

    #[test]
    fn test_decisions_are_frozen_while_submission_is_in_flight() {
        let mut approvals = ApprovalCoordinator::new("c1");
        approvals.activate(calls());
        approvals.decide("t1", true).unwrap();

        let sent = approvals.begin_submit(None).unwrap();
        assert_eq!(approvals.decide("t1", false), Err(ApprovalError::InFlight));
        assert_eq!(approvals.decide_all(true), Err(ApprovalError::InFlight));
        assert_eq!(approvals.decision("t1"), Some(true));
        assert_eq!(approvals.decision("t2"), None);

        approvals.finish_submit(false);
        assert_eq!(approvals.begin_submit(None).unwrap(), sent);
    }

    #[test]
    fn test_failed_submit_keeps_decisions_for_retry() {
        let mut approvals = ApprovalCoordinator::new("c1");
        approvals.activate(calls());
        approvals.decide_all(true).unwrap();

        let first = approvals.begin_submit(Some("  ")).unwrap();
        assert_eq!(approvals.begin_submit(None), Err(ApprovalError::InFlight));
        approvals.finish_submit(false);

        assert!(approvals.is_awaiting());
        let retry = approvals.begin_submit(None).unwrap();
        assert_eq!(first, retry);

        approvals.finish_submit(true);
        assert!(!approvals.is_awaiting());
        assert_eq!(approvals.decision("t1"), None);
    }

    #[test]
    fn test_reactivation_keeps_choices_for_calls_still_pending() {
        let mut approvals = ApprovalCoordinator::new("c1");
        approvals.activate(calls());
        approvals.decide("t1", true).unwrap();
        approvals.decide("t2", false).unwrap();

        approvals.activate(vec![calls().remove(0)]);
        assert_eq!(approvals.decision("t1"), Some(true));
        assert_eq!(approvals.decision("t2"), None);
        assert_eq!(approvals.undecided().count(), 0);
    }

    #[test]
    fn test_deny_message_is_attached_to_whole_batch() {
        let mut approvals = ApprovalCoordinator::new("c1");
        approvals.activate(calls());
        let batch = approvals.begin_submit(Some("use git ls-files instead")).unwrap();
        assert_eq!(
            batch.user_message.as_deref(),
            Some("use git ls-files instead")
        );
        assert!(batch.decisions.values().all(|approved| !approved));
    }
}
