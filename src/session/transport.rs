use crate::api::{ByteStream, SseFrame, StreamParser, StreamSource, TransportError};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq)]
pub enum TransportMessage {
    Frame(SseFrame),
    /// The server ended the stream without an error.
    Closed,
    Failed(TransportError),
}

/// One live SSE connection, read by a background task.
///
/// The generation identifies which connect produced it. Dropping the
/// transport cancels the reader, so no message outlives its owner.
pub struct Transport {
    generation: u64,
    cancel: CancellationToken,
    rx: mpsc::UnboundedReceiver<TransportMessage>,
    task: JoinHandle<()>,
}

impl Transport {
    pub fn open(
        source: Arc<dyn StreamSource>,
        chat_id: &str,
        last_index: u64,
        generation: u64,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let stream = source.open_stream(chat_id, last_index);
        let task = tokio::spawn(read_frames(stream, tx, cancel.clone()));

        tracing::debug!(chat_id, last_index, generation, "stream_transport_opened");

        Self {
            generation,
            cancel,
            rx,
            task,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Waits for the next message. Returns `None` once the reader is gone.
    /// Cancel-safe.
    pub async fn recv(&mut self) -> Option<TransportMessage> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<TransportMessage> {
        self.rx.try_recv().ok()
    }

    pub fn close(&mut self) {
        if !self.cancel.is_cancelled() {
            tracing::debug!(generation = self.generation, "stream_transport_closed");
        }
        self.cancel.cancel();
        self.rx.close();
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.task.abort();
    }
}

async fn read_frames(
    mut stream: ByteStream,
    tx: mpsc::UnboundedSender<TransportMessage>,
    cancel: CancellationToken,
) {
    let mut parser = StreamParser::new();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            next = stream.next() => next,
        };

        match next {
            Some(Ok(chunk)) => {
                for frame in parser.process(&chunk) {
                    if tx.send(TransportMessage::Frame(frame)).is_err() {
                        return;
                    }
                }
            }
            Some(Err(error)) => {
                let _ = tx.send(TransportMessage::Failed(error));
                return;
            }
            None => {
                if let Some(frame) = parser.finish() {
                    let _ = tx.send(TransportMessage::Frame(frame));
                }
                let _ = tx.send(TransportMessage::Closed);
                return;
            }
        }
    }
}
