pub mod client;
pub mod credential;
pub mod decode;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod mock_client;
pub mod stream;

pub use client::{ApiClient, CreateChatRequest, Endpoints};
pub use credential::Credential;
pub use decode::{decode_event, is_message_event};
pub use dispatch::{ActionDispatcher, ByteStream, DecisionBatch, StreamSource};
pub use error::{ApiError, AuthError, DecodeError, TransportError};
pub use stream::{SseFrame, StreamParser};
