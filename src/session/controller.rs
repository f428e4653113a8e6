use super::context::SessionContext;
use super::error::SessionError;
use super::events::{
    emit_session_update, ConnectionStatus, SessionStreamState, SessionUpdate, StreamPhase,
};
use super::transport::{Transport, TransportMessage};
use crate::api::{decode_event, is_message_event};
use crate::api::logging::emit_decode_failure;
use crate::api::{ApiError, DecisionBatch, SseFrame, TransportError};
use crate::state::{ApprovalCoordinator, Timeline};
use crate::types::{StreamEvent, ToolCallRequest};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Owns one chat's stream: the live transport, the resume cursor, the
/// timeline folded from received events, and the pending approvals.
///
/// Only one transport is ever held; every reconnect replaces (and thereby
/// cancels) the previous one.
pub struct SessionController {
    context: SessionContext,
    state: SessionStreamState,
    phase: StreamPhase,
    timeline: Timeline,
    approvals: ApprovalCoordinator,
    transport: Option<Transport>,
    generation: u64,
    auto_approve: Option<bool>,
    updates: Option<mpsc::UnboundedSender<SessionUpdate>>,
}

impl SessionController {
    pub fn new(context: SessionContext, chat_id: impl Into<String>) -> Self {
        let chat_id = chat_id.into();
        Self {
            context,
            approvals: ApprovalCoordinator::new(chat_id.clone()),
            state: SessionStreamState::new(chat_id),
            phase: StreamPhase::Idle,
            timeline: Timeline::new(),
            transport: None,
            generation: 0,
            auto_approve: None,
            updates: None,
        }
    }

    pub fn with_updates(mut self, updates: mpsc::UnboundedSender<SessionUpdate>) -> Self {
        self.updates = Some(updates);
        self
    }

    pub fn with_auto_approve(mut self, enabled: bool) -> Self {
        self.auto_approve = Some(enabled);
        self
    }

    pub fn chat_id(&self) -> &str {
        &self.state.chat_id
    }

    pub fn state(&self) -> &SessionStreamState {
        &self.state
    }

    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn approvals(&self) -> &ApprovalCoordinator {
        &self.approvals
    }

    pub fn pending_approvals(&self) -> &[ToolCallRequest] {
        self.approvals.pending()
    }

    pub fn auto_approve(&self) -> Option<bool> {
        self.auto_approve
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True while a transport is held and may still deliver messages.
    pub fn is_live(&self) -> bool {
        self.transport.is_some()
    }

    /// First connect for a selected chat, from ordinal 0 unless events were
    /// already consumed.
    pub fn open(&mut self) -> Result<(), SessionError> {
        self.ensure_not_closed()?;
        self.state.terminal = false;
        self.connect();
        Ok(())
    }

    /// Resumes at the last consumed ordinal after a dropped stream.
    pub fn reconnect(&mut self) -> Result<(), SessionError> {
        self.ensure_not_closed()?;
        self.state.terminal = false;
        self.connect();
        Ok(())
    }

    /// Waits for the next transport message. Returns `None` when no
    /// transport is held. Cancel-safe, so it can sit in a `select!`.
    pub async fn recv_transport(&mut self) -> Option<TransportMessage> {
        let transport = self.transport.as_mut()?;
        Some(transport.recv().await.unwrap_or(TransportMessage::Closed))
    }

    /// Receives and handles one transport message. Returns false when there
    /// was nothing to wait on.
    pub async fn process_next(&mut self) -> bool {
        match self.recv_transport().await {
            Some(message) => {
                self.handle_transport(message);
                true
            }
            None => false,
        }
    }

    /// Handles every message already buffered, without waiting.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Some(message) = self.transport.as_mut().and_then(Transport::try_recv) {
            self.handle_transport(message);
            handled += 1;
        }
        handled
    }

    pub fn handle_transport(&mut self, message: TransportMessage) {
        match message {
            TransportMessage::Frame(frame) => self.handle_frame(frame),
            TransportMessage::Closed => self.handle_stream_end(),
            TransportMessage::Failed(error) => self.handle_transport_error(error),
        }
    }

    pub async fn send_message(&mut self, prompt: &str) -> Result<(), SessionError> {
        self.ensure_not_closed()?;
        if self.approvals.is_awaiting() || self.approvals.is_in_flight() {
            return Err(SessionError::AwaitingApproval);
        }
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(SessionError::EmptyMessage);
        }

        let dispatcher = Arc::clone(&self.context.dispatcher);
        let result = dispatcher.send_message(&self.state.chat_id, prompt).await;
        if let Err(error) = result {
            return Err(self.action_failed("send_message", error));
        }

        self.state.terminal = false;
        self.connect();
        Ok(())
    }

    pub fn decide(&mut self, tool_id: &str, approved: bool) -> Result<(), SessionError> {
        self.approvals.decide(tool_id, approved)?;
        Ok(())
    }

    pub fn decide_all(&mut self, approved: bool) -> Result<(), SessionError> {
        self.approvals.decide_all(approved)?;
        Ok(())
    }

    /// Submits the decision batch. On success the stream is reopened at the
    /// resume cursor; on failure every decision is kept for a retry.
    pub async fn submit_decisions(
        &mut self,
        deny_message: Option<&str>,
    ) -> Result<DecisionBatch, SessionError> {
        self.ensure_not_closed()?;
        let batch = self.approvals.begin_submit(deny_message)?;

        let dispatcher = Arc::clone(&self.context.dispatcher);
        let result = dispatcher.submit_decisions(&batch).await;
        self.approvals.finish_submit(result.is_ok());
        if let Err(error) = result {
            return Err(self.action_failed("submit_decisions", error));
        }

        tracing::debug!(
            chat_id = %self.state.chat_id,
            decisions = batch.decisions.len(),
            "approval_decisions_submitted"
        );
        self.emit(SessionUpdate::ApprovalsSubmitted);
        self.state.terminal = false;
        self.connect();
        Ok(batch)
    }

    /// Stops the run. The session stays usable: a follow-up message resumes it.
    pub async fn stop(&mut self) -> Result<(), SessionError> {
        self.ensure_not_closed()?;
        let dispatcher = Arc::clone(&self.context.dispatcher);
        let result = dispatcher.stop(&self.state.chat_id).await;
        if let Err(error) = result {
            return Err(self.action_failed("stop", error));
        }

        self.drop_transport();
        self.approvals.clear();
        self.state.terminal = true;
        self.set_phase(StreamPhase::Completed);
        self.emit(SessionUpdate::ChatListStale);
        Ok(())
    }

    pub async fn set_auto_approve(&mut self, enabled: bool) -> Result<bool, SessionError> {
        self.ensure_not_closed()?;
        let dispatcher = Arc::clone(&self.context.dispatcher);
        let result = dispatcher
            .set_auto_approve(&self.state.chat_id, enabled)
            .await;
        match result {
            Ok(stored) => {
                self.auto_approve = Some(stored);
                self.emit(SessionUpdate::AutoApprove(stored));
                Ok(stored)
            }
            Err(error) => Err(self.action_failed("set_auto_approve", error)),
        }
    }

    pub async fn share(&mut self, message_id: Option<&str>) -> Result<String, SessionError> {
        self.ensure_not_closed()?;
        let dispatcher = Arc::clone(&self.context.dispatcher);
        let result = dispatcher.share(&self.state.chat_id, message_id).await;
        result.map_err(|error| self.action_failed("share", error))
    }

    /// Tears the session down for good.
    pub fn close(&mut self) {
        if self.phase == StreamPhase::Closed {
            return;
        }
        self.drop_transport();
        self.set_phase(StreamPhase::Closed);
    }

    fn connect(&mut self) {
        self.drop_transport();
        self.generation += 1;
        self.transport = Some(Transport::open(
            Arc::clone(&self.context.source),
            &self.state.chat_id,
            self.state.last_consumed_ordinal,
            self.generation,
        ));
        self.state.connection_status = ConnectionStatus::Connecting;
        self.set_phase(StreamPhase::Connecting);
    }

    fn drop_transport(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
        self.state.connection_status = ConnectionStatus::Closed;
    }

    fn handle_frame(&mut self, frame: SseFrame) {
        self.state.connection_status = ConnectionStatus::Open;

        let event = match decode_event(&frame.event, &frame.data) {
            Ok(event) => event,
            Err(error) => {
                emit_decode_failure(&self.state.chat_id, &frame.event, &frame.data, &error);
                // Only message frames occupy a slot in the ordinal sequence.
                if error.ordinal().is_some() || is_message_event(&frame.event) {
                    self.advance_ordinal(error.ordinal());
                }
                return;
            }
        };

        match event {
            StreamEvent::Message(message) => {
                self.mark_streaming();
                self.advance_ordinal(Some(message.ordinal));
                for update in self.timeline.apply(&message) {
                    self.emit(SessionUpdate::Timeline(update));
                }
            }
            StreamEvent::Ask { tool_calls } => {
                if tool_calls.is_empty() {
                    tracing::debug!(chat_id = %self.state.chat_id, "ignoring ask without tool calls");
                    self.mark_streaming();
                    return;
                }
                self.approvals.activate(tool_calls.clone());
                self.set_phase(StreamPhase::AwaitingApproval);
                self.emit(SessionUpdate::ApprovalRequested(tool_calls));
            }
            StreamEvent::Done { status } => {
                self.drop_transport();
                self.state.terminal = true;
                self.set_phase(StreamPhase::Completed);
                self.emit(SessionUpdate::Completed(status));
                self.emit(SessionUpdate::ChatListStale);
            }
            StreamEvent::ServerError { message } => {
                tracing::warn!(chat_id = %self.state.chat_id, "stream reported error: {message}");
                self.drop_transport();
                self.emit(SessionUpdate::ServerError(message));
            }
            StreamEvent::Passthrough {
                event,
                content,
                ordinal,
            } => {
                self.mark_streaming();
                let replayed =
                    ordinal.is_some_and(|ordinal| ordinal < self.state.last_consumed_ordinal);
                if ordinal.is_some() {
                    self.advance_ordinal(ordinal);
                }
                tracing::debug!(chat_id = %self.state.chat_id, event = %event, "passthrough_event");
                if !replayed && !content.trim().is_empty() {
                    let update = self.timeline.push_system(content);
                    self.emit(SessionUpdate::Timeline(update));
                }
            }
        }
    }

    fn handle_stream_end(&mut self) {
        self.drop_transport();
        match self.phase {
            StreamPhase::Completed | StreamPhase::Closed => {}
            StreamPhase::AwaitingApproval => {
                tracing::debug!(chat_id = %self.state.chat_id, "stream ended while awaiting approval");
            }
            _ => {
                tracing::warn!(
                    chat_id = %self.state.chat_id,
                    last_index = self.state.last_consumed_ordinal,
                    "stream ended before done"
                );
                self.emit(SessionUpdate::TransportLost(
                    "stream ended before the run finished".to_string(),
                ));
            }
        }
    }

    fn handle_transport_error(&mut self, error: TransportError) {
        if error.is_auth() {
            self.log_out();
            return;
        }
        tracing::warn!(
            chat_id = %self.state.chat_id,
            generation = self.generation,
            "stream transport failed: {error}"
        );
        self.drop_transport();
        self.emit(SessionUpdate::TransportLost(error.to_string()));
    }

    fn action_failed(&mut self, action: &'static str, error: ApiError) -> SessionError {
        tracing::warn!(chat_id = %self.state.chat_id, action, "request failed: {error}");
        if error.is_auth() {
            self.log_out();
        }
        SessionError::Api(error)
    }

    fn log_out(&mut self) {
        tracing::warn!(chat_id = %self.state.chat_id, "credential rejected; closing session");
        self.drop_transport();
        self.approvals.clear();
        self.set_phase(StreamPhase::Closed);
        self.emit(SessionUpdate::LoggedOut);
    }

    /// Advances the resume cursor past `ordinal`, or by one when the event's
    /// ordinal could not be read. Never moves backwards.
    fn advance_ordinal(&mut self, ordinal: Option<u64>) {
        let next = match ordinal {
            Some(ordinal) => ordinal.saturating_add(1),
            None => self.state.last_consumed_ordinal.saturating_add(1),
        };
        self.state.last_consumed_ordinal = self.state.last_consumed_ordinal.max(next);
    }

    fn mark_streaming(&mut self) {
        if self.phase == StreamPhase::Connecting {
            self.set_phase(StreamPhase::Streaming);
        }
    }

    fn set_phase(&mut self, phase: StreamPhase) {
        if self.phase == phase {
            return;
        }
        tracing::debug!(
            chat_id = %self.state.chat_id,
            from = self.phase.as_str(),
            to = phase.as_str(),
            "session_phase"
        );
        self.phase = phase;
        self.emit(SessionUpdate::Phase(phase));
    }

    fn ensure_not_closed(&self) -> Result<(), SessionError> {
        if self.phase == StreamPhase::Closed {
            return Err(SessionError::Closed(self.state.chat_id.clone()));
        }
        Ok(())
    }

    fn emit(&self, update: SessionUpdate) {
        emit_session_update(self.updates.as_ref(), update);
    }
}
