use crate::api::{ActionDispatcher, ApiClient, StreamSource};
use std::sync::Arc;

/// Collaborators a session needs, injected at construction. The credential
/// lives inside them; the controller never looks one up.
#[derive(Clone)]
pub struct SessionContext {
    pub dispatcher: Arc<dyn ActionDispatcher>,
    pub source: Arc<dyn StreamSource>,
}

impl SessionContext {
    pub fn new(dispatcher: Arc<dyn ActionDispatcher>, source: Arc<dyn StreamSource>) -> Self {
        Self { dispatcher, source }
    }

    pub fn from_client(client: Arc<ApiClient>) -> Self {
        Self {
            dispatcher: client.clone(),
            source: client,
        }
    }
}
