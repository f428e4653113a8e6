use super::dispatch::{ActionDispatcher, ByteStream, DecisionBatch, StreamSource};
use super::error::{ApiError, TransportError};
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::{stream, StreamExt};
use reqwest::StatusCode;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

enum ScriptedStream {
    Frames { frames: Vec<String>, hold_open: bool },
    Fail(TransportError),
}

/// Scripted SSE responses, one script consumed per `open_stream` call.
#[derive(Clone, Default)]
pub struct MockStreamSource {
    scripts: Arc<Mutex<VecDeque<ScriptedStream>>>,
    opened: Arc<Mutex<Vec<(String, u64)>>>,
}

impl MockStreamSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames are delivered, then the stream ends.
    pub fn push_frames(&self, frames: Vec<String>) {
        lock(&self.scripts).push_back(ScriptedStream::Frames {
            frames,
            hold_open: false,
        });
    }

    /// Frames are delivered, then the stream stays open without data.
    pub fn push_open(&self, frames: Vec<String>) {
        lock(&self.scripts).push_back(ScriptedStream::Frames {
            frames,
            hold_open: true,
        });
    }

    pub fn push_failure(&self, error: TransportError) {
        lock(&self.scripts).push_back(ScriptedStream::Fail(error));
    }

    /// `(chat_id, last_index)` of every stream opened so far.
    pub fn opened(&self) -> Vec<(String, u64)> {
        lock(&self.opened).clone()
    }
}

impl StreamSource for MockStreamSource {
    fn open_stream(&self, chat_id: &str, last_index: u64) -> ByteStream {
        lock(&self.opened).push((chat_id.to_string(), last_index));

        let Some(script) = lock(&self.scripts).pop_front() else {
            return Box::pin(stream::iter(vec![Err(TransportError::Connect {
                url: "mock://stream".to_string(),
                message: "MockStreamSource: No more responses configured".to_string(),
            })]));
        };

        match script {
            ScriptedStream::Fail(error) => Box::pin(stream::iter(vec![Err(error)])),
            ScriptedStream::Frames { frames, hold_open } => {
                let chunks: Vec<Result<Bytes, TransportError>> = frames
                    .into_iter()
                    .map(|s| {
                        let framed = if s.ends_with("\n\n") {
                            s
                        } else {
                            format!("{s}\n\n")
                        };
                        Ok(Bytes::from(framed))
                    })
                    .collect();
                let chunks = stream::iter(chunks);
                if hold_open {
                    Box::pin(chunks.chain(stream::pending()))
                } else {
                    Box::pin(chunks)
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchedAction {
    SendMessage { chat_id: String, prompt: String },
    SubmitDecisions(DecisionBatch),
    Stop { chat_id: String },
    SetAutoApprove { chat_id: String, enabled: bool },
    Share { chat_id: String, message_id: Option<String> },
}

enum ScriptedFailure {
    Status(StatusCode, String),
    Auth(u16),
}

/// Records every action; failures can be queued for the next calls.
#[derive(Clone, Default)]
pub struct MockDispatcher {
    actions: Arc<Mutex<Vec<DispatchedAction>>>,
    failures: Arc<Mutex<VecDeque<ScriptedFailure>>>,
}

impl MockDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, status: StatusCode, body: impl Into<String>) {
        lock(&self.failures).push_back(ScriptedFailure::Status(status, body.into()));
    }

    pub fn reject_next_credential(&self) {
        lock(&self.failures).push_back(ScriptedFailure::Auth(401));
    }

    pub fn actions(&self) -> Vec<DispatchedAction> {
        lock(&self.actions).clone()
    }

    fn record(&self, action: DispatchedAction) -> Result<(), ApiError> {
        lock(&self.actions).push(action);
        match lock(&self.failures).pop_front() {
            None => Ok(()),
            Some(ScriptedFailure::Status(status, body)) => Err(ApiError::Request {
                url: "mock://dispatch".to_string(),
                status,
                body,
            }),
            Some(ScriptedFailure::Auth(status)) => {
                Err(super::error::AuthError::Rejected { status }.into())
            }
        }
    }
}

impl ActionDispatcher for MockDispatcher {
    fn send_message<'a>(
        &'a self,
        chat_id: &'a str,
        prompt: &'a str,
    ) -> BoxFuture<'a, Result<(), ApiError>> {
        let result = self.record(DispatchedAction::SendMessage {
            chat_id: chat_id.to_string(),
            prompt: prompt.to_string(),
        });
        Box::pin(async move { result })
    }

    fn submit_decisions<'a>(
        &'a self,
        batch: &'a DecisionBatch,
    ) -> BoxFuture<'a, Result<(), ApiError>> {
        let result = self.record(DispatchedAction::SubmitDecisions(batch.clone()));
        Box::pin(async move { result })
    }

    fn stop<'a>(&'a self, chat_id: &'a str) -> BoxFuture<'a, Result<(), ApiError>> {
        let result = self.record(DispatchedAction::Stop {
            chat_id: chat_id.to_string(),
        });
        Box::pin(async move { result })
    }

    fn set_auto_approve<'a>(
        &'a self,
        chat_id: &'a str,
        enabled: bool,
    ) -> BoxFuture<'a, Result<bool, ApiError>> {
        let result = self
            .record(DispatchedAction::SetAutoApprove {
                chat_id: chat_id.to_string(),
                enabled,
            })
            .map(|()| enabled);
        Box::pin(async move { result })
    }

    fn share<'a>(
        &'a self,
        chat_id: &'a str,
        message_id: Option<&'a str>,
    ) -> BoxFuture<'a, Result<String, ApiError>> {
        let result = self
            .record(DispatchedAction::Share {
                chat_id: chat_id.to_string(),
                message_id: message_id.map(ToString::to_string),
            })
            .map(|()| format!("share-{chat_id}"));
        Box::pin(async move { result })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
