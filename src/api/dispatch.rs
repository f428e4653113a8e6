use super::error::{ApiError, TransportError};
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::Stream;
use serde::Serialize;
use std::collections::BTreeMap;
use std::pin::Pin;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// Opens the per-chat event stream. Connection happens lazily, on first poll,
/// and connection failures surface as the stream's first item.
pub trait StreamSource: Send + Sync {
    fn open_stream(&self, chat_id: &str, last_index: u64) -> ByteStream;
}

/// Body of the approve endpoint: one boolean per tool call id plus an
/// optional rationale that applies to the whole batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecisionBatch {
    pub chat_id: String,
    pub decisions: BTreeMap<String, bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_message: Option<String>,
}

/// Stateless user actions against the chat server.
pub trait ActionDispatcher: Send + Sync {
    fn send_message<'a>(
        &'a self,
        chat_id: &'a str,
        prompt: &'a str,
    ) -> BoxFuture<'a, Result<(), ApiError>>;

    fn submit_decisions<'a>(&'a self, batch: &'a DecisionBatch)
        -> BoxFuture<'a, Result<(), ApiError>>;

    fn stop<'a>(&'a self, chat_id: &'a str) -> BoxFuture<'a, Result<(), ApiError>>;

    /// Resolves to the flag value the server stored.
    fn set_auto_approve<'a>(
        &'a self,
        chat_id: &'a str,
        enabled: bool,
    ) -> BoxFuture<'a, Result<bool, ApiError>>;

    /// Resolves to the new share id.
    fn share<'a>(
        &'a self,
        chat_id: &'a str,
        message_id: Option<&'a str>,
    ) -> BoxFuture<'a, Result<String, ApiError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_batch_wire_shape() {
        let batch = DecisionBatch {
            chat_id: "c1".to_string(),
            decisions: BTreeMap::from([("t1".to_string(), true), ("t2".to_string(), false)]),
            user_message: None,
        };
        let value = serde_json::to_value(&batch).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"chat_id": "c1", "decisions": {"t1": true, "t2": false}})
        );
    }
}
