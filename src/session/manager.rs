use super::context::SessionContext;
use super::controller::SessionController;
use super::error::SessionError;
use super::events::{SessionUpdate, StreamPhase};
use std::collections::HashMap;
use tokio::sync::mpsc;

/// Sessions keyed by chat id. Selecting a chat tears down the previously
/// active session before the new one connects.
pub struct SessionManager {
    context: SessionContext,
    sessions: HashMap<String, SessionController>,
    active: Option<String>,
    updates: Option<mpsc::UnboundedSender<SessionUpdate>>,
}

impl SessionManager {
    pub fn new(context: SessionContext) -> Self {
        Self {
            context,
            sessions: HashMap::new(),
            active: None,
            updates: None,
        }
    }

    pub fn with_updates(mut self, updates: mpsc::UnboundedSender<SessionUpdate>) -> Self {
        self.updates = Some(updates);
        self
    }

    pub fn active_chat_id(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn active(&self) -> Option<&SessionController> {
        self.active.as_ref().and_then(|id| self.sessions.get(id))
    }

    pub fn active_mut(&mut self) -> Option<&mut SessionController> {
        self.active.as_ref().and_then(|id| self.sessions.get_mut(id))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Makes `chat_id` the active session and opens its stream. Reselecting
    /// the active chat keeps its session unless that session was closed.
    pub fn select(
        &mut self,
        chat_id: &str,
        auto_approve: Option<bool>,
    ) -> Result<&mut SessionController, SessionError> {
        let reuse = self.active.as_deref() == Some(chat_id)
            && self
                .sessions
                .get(chat_id)
                .is_some_and(|session| session.phase() != StreamPhase::Closed);

        if !reuse {
            self.close_active();

            let mut session = SessionController::new(self.context.clone(), chat_id);
            if let Some(updates) = &self.updates {
                session = session.with_updates(updates.clone());
            }
            if let Some(enabled) = auto_approve {
                session = session.with_auto_approve(enabled);
            }
            session.open()?;

            tracing::debug!(chat_id, "session_selected");
            self.sessions.insert(chat_id.to_string(), session);
            self.active = Some(chat_id.to_string());
        }

        self.sessions
            .get_mut(chat_id)
            .ok_or_else(|| SessionError::Closed(chat_id.to_string()))
    }

    /// Closes and forgets the active session, if any.
    pub fn close_active(&mut self) {
        if let Some(previous) = self.active.take() {
            if let Some(mut session) = self.sessions.remove(&previous) {
                session.close();
            }
        }
    }

    pub fn close_all(&mut self) {
        self.active = None;
        for (_, mut session) in self.sessions.drain() {
            session.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock_client::{MockDispatcher, MockStreamSource};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_select_tears_down_previous_session_first() {
        let source = MockStreamSource::new();
        source.push_open(vec![]);
        source.push_open(vec![]);
        let context = SessionContext::new(Arc::new(MockDispatcher::new()), Arc::new(source.clone()));
        let mut manager = SessionManager::new(context);

        manager.select("a", None).unwrap();
        assert!(manager.active().unwrap().is_live());

        manager.select("b", Some(true)).unwrap();
        assert_eq!(manager.active_chat_id(), Some("b"));
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.active().unwrap().auto_approve(), Some(true));
        assert_eq!(
            source.opened(),
            vec![("a".to_string(), 0), ("b".to_string(), 0)]
        );
    }

    #[tokio::test]
    async fn test_reselecting_active_chat_keeps_its_stream() {
        let source = MockStreamSource::new();
        source.push_open(vec![]);
        let context = SessionContext::new(Arc::new(MockDispatcher::new()), Arc::new(source.clone()));
        let mut manager = SessionManager::new(context);

        let generation = manager.select("a", None).unwrap().generation();
        assert_eq!(manager.select("a", None).unwrap().generation(), generation);
        assert_eq!(source.opened().len(), 1);

        manager.close_all();
        assert!(manager.is_empty());
        assert!(manager.active().is_none());
    }
}
