use reqwest::StatusCode;
use thiserror::Error;

/// A single SSE payload could not be turned into a [`crate::types::StreamEvent`].
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed JSON in `{event}` event: {source}")]
    MalformedJson {
        event: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("`{event}` event is missing required field `{field}`")]
    MissingField {
        event: String,
        field: &'static str,
        ordinal: Option<u64>,
    },
    #[error("`{event}` event has invalid `{field}`: {detail}")]
    InvalidField {
        event: String,
        field: &'static str,
        detail: String,
        ordinal: Option<u64>,
    },
}

impl DecodeError {
    /// Ordinal of the failed event when the envelope was readable.
    pub fn ordinal(&self) -> Option<u64> {
        match self {
            Self::MalformedJson { .. } => None,
            Self::MissingField { ordinal, .. } | Self::InvalidField { ordinal, .. } => *ordinal,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("no credential is configured")]
    Missing,
    #[error("credential rejected by server (HTTP {status})")]
    Rejected { status: u16 },
}

/// Failure of the event stream connection itself.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("cannot reach stream endpoint '{url}': {message}")]
    Connect { url: String, message: String },
    #[error("stream endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("stream read failed: {0}")]
    Read(String),
    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl TransportError {
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

/// Failure of a dispatched (non-streaming) request.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request to '{url}' returned HTTP {status}: {body}")]
    Request {
        url: String,
        status: StatusCode,
        body: String,
    },
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("cannot reach '{url}': {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("unexpected response body from '{url}': {detail}")]
    Body { url: String, detail: String },
}

impl ApiError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Request { status, .. } => Some(*status),
            Self::Auth(AuthError::Rejected { status }) => StatusCode::from_u16(*status).ok(),
            _ => None,
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

pub(crate) fn is_auth_status(status: StatusCode) -> bool {
    matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_reports_known_ordinal() {
        let error = DecodeError::MissingField {
            event: "message".to_string(),
            field: "role",
            ordinal: Some(4),
        };
        assert_eq!(error.ordinal(), Some(4));
        assert_eq!(
            error.to_string(),
            "`message` event is missing required field `role`"
        );
    }

    #[test]
    fn test_api_error_status_includes_auth_rejections() {
        let error = ApiError::Auth(AuthError::Rejected { status: 401 });
        assert_eq!(error.status(), Some(StatusCode::UNAUTHORIZED));
        assert!(error.is_auth());
    }
}
