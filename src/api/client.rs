use super::credential::Credential;
use super::dispatch::{ActionDispatcher, ByteStream, DecisionBatch, StreamSource};
use super::error::{is_auth_status, ApiError, AuthError, TransportError};
use super::logging::{debug_payload_enabled, emit_debug_payload};
use crate::config::Config;
use crate::types::{ChatDetail, ChatSummary, SharedChat};
use crate::util::is_local_endpoint_url;
use anyhow::Result;
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::{stream, Stream, StreamExt, TryStreamExt};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

/// Server paths, relative to the configured API base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub stream: String,
    pub approve: String,
    pub message: String,
    pub stop: String,
    pub auto_approve: String,
    pub share: String,
    pub list: String,
    pub create: String,
    pub detail: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            stream: "/chat/messages".to_string(),
            approve: "/chat/approve".to_string(),
            message: "/chat/message".to_string(),
            stop: "/chat/stop".to_string(),
            auto_approve: "/chat/auto_approve".to_string(),
            share: "/chat/share".to_string(),
            list: "/chat/list".to_string(),
            create: "/chat".to_string(),
            detail: "/chat/detail".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CreateChatRequest {
    pub prompt: String,
    pub bot_name: Option<String>,
    pub chat_id: Option<String>,
    pub auto_approve: bool,
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    stream_http: reqwest::Client,
    api_url: String,
    endpoints: Endpoints,
    credential: Option<Credential>,
    /// Local development servers are reachable without a credential.
    allow_anonymous: bool,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        // Streams stay open for the whole run, so only the connect phase is bounded.
        let stream_http = reqwest::Client::builder()
            .connect_timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            http,
            stream_http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            endpoints: Endpoints::default(),
            credential: config.credential.clone(),
            allow_anonymous: is_local_endpoint_url(&config.api_url),
        })
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_credential(mut self, credential: Option<Credential>) -> Self {
        self.credential = credential;
        self
    }

    pub fn has_credential(&self) -> bool {
        self.credential.is_some()
    }

    pub fn endpoint_url(&self, path: &str) -> String {
        format!("{}/{}", self.api_url, path.trim_start_matches('/'))
    }

    pub async fn create_chat(&self, request: &CreateChatRequest) -> Result<String, ApiError> {
        let mut payload = json!({
            "prompt": request.prompt,
            "auto_approve": request.auto_approve,
        });
        if let Some(object) = payload.as_object_mut() {
            if let Some(bot_name) = &request.bot_name {
                object.insert("bot_name".to_string(), json!(bot_name));
            }
            if let Some(chat_id) = &request.chat_id {
                object.insert("chat_id".to_string(), json!(chat_id));
            }
        }

        let url = self.endpoint_url(&self.endpoints.create);
        let body = self.post_json(&url, &payload).await?;
        let value: Value = parse_body(&url, &body)?;
        value
            .get("chat_id")
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| ApiError::Body {
                url,
                detail: "missing chat_id".to_string(),
            })
    }

    pub async fn list_chats(&self, query: Option<&str>) -> Result<Vec<ChatSummary>, ApiError> {
        let url = self.endpoint_url(&self.endpoints.list);
        let query: Vec<(&str, &str)> = query
            .map(str::trim)
            .filter(|query| !query.is_empty())
            .map(|query| vec![("query", query)])
            .unwrap_or_default();
        let body = self.get(&url, &query, true).await?;
        parse_body(&url, &body)
    }

    pub async fn chat_detail(&self, chat_id: &str) -> Result<ChatDetail, ApiError> {
        let url = self.endpoint_url(&self.endpoints.detail);
        let body = self.get(&url, &[("chat_id", chat_id)], true).await?;
        parse_body(&url, &body)
    }

    /// Share snapshots are public; no credential is sent.
    pub async fn fetch_shared(&self, share_id: &str) -> Result<SharedChat, ApiError> {
        let url = self.endpoint_url(&self.endpoints.share);
        let body = self.get(&url, &[("share_id", share_id)], false).await?;
        parse_body(&url, &body)
    }

    pub async fn send_message(&self, chat_id: &str, prompt: &str) -> Result<(), ApiError> {
        let url = self.endpoint_url(&self.endpoints.message);
        self.post_json(&url, &json!({ "chat_id": chat_id, "prompt": prompt }))
            .await
            .map(|_| ())
    }

    pub async fn submit_decisions(&self, batch: &DecisionBatch) -> Result<(), ApiError> {
        let url = self.endpoint_url(&self.endpoints.approve);
        let payload = serde_json::to_value(batch).map_err(|error| ApiError::Body {
            url: url.clone(),
            detail: error.to_string(),
        })?;
        self.post_json(&url, &payload).await.map(|_| ())
    }

    pub async fn stop(&self, chat_id: &str) -> Result<(), ApiError> {
        let url = self.endpoint_url(&self.endpoints.stop);
        self.post_json(&url, &json!({ "chat_id": chat_id }))
            .await
            .map(|_| ())
    }

    pub async fn set_auto_approve(&self, chat_id: &str, enabled: bool) -> Result<bool, ApiError> {
        let url = self.endpoint_url(&self.endpoints.auto_approve);
        let body = self
            .post_json(&url, &json!({ "chat_id": chat_id, "auto_approve": enabled }))
            .await?;
        let stored = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|value| value.get("auto_approve").and_then(Value::as_bool))
            .unwrap_or(enabled);
        Ok(stored)
    }

    pub async fn share(&self, chat_id: &str, message_id: Option<&str>) -> Result<String, ApiError> {
        let url = self.endpoint_url(&self.endpoints.share);
        let mut payload = json!({ "chat_id": chat_id });
        if let (Some(object), Some(message_id)) = (payload.as_object_mut(), message_id) {
            object.insert("message_id".to_string(), json!(message_id));
        }
        let body = self.post_json(&url, &payload).await?;
        let value: Value = parse_body(&url, &body)?;
        value
            .get("share_id")
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| ApiError::Body {
                url,
                detail: "missing share_id".to_string(),
            })
    }

    async fn connect_stream(
        &self,
        chat_id: &str,
        last_index: u64,
    ) -> Result<impl Stream<Item = Result<Bytes, TransportError>>, TransportError> {
        let credential = self.credential()?;
        let url = self.endpoint_url(&self.endpoints.stream);
        let last_index = last_index.to_string();

        let mut request = self
            .stream_http
            .get(&url)
            .query(&[("chat_id", chat_id), ("last_index", last_index.as_str())])
            .header("accept", "text/event-stream");
        if let Some(credential) = credential {
            // EventSource-style endpoints read the token from the query string.
            request = request
                .query(&[("token", credential.expose())])
                .bearer_auth(credential.expose());
        }

        let response = request
            .send()
            .await
            .map_err(|error| TransportError::Connect {
                url: url.clone(),
                message: error.to_string(),
            })?;

        let status = response.status();
        if is_auth_status(status) {
            return Err(AuthError::Rejected {
                status: status.as_u16(),
            }
            .into());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response
            .bytes_stream()
            .map(|item| item.map_err(|error| TransportError::Read(error.to_string()))))
    }

    /// The configured credential, `None` only for local endpoints.
    fn credential(&self) -> Result<Option<&Credential>, AuthError> {
        match &self.credential {
            Some(credential) => Ok(Some(credential)),
            None if self.allow_anonymous => Ok(None),
            None => Err(AuthError::Missing),
        }
    }

    async fn post_json(&self, url: &str, payload: &Value) -> Result<String, ApiError> {
        let credential = self.credential()?;
        if debug_payload_enabled() {
            emit_debug_payload(url, payload);
        }

        let mut request = self.http.post(url).json(payload);
        if let Some(credential) = credential {
            request = request.bearer_auth(credential.expose());
        }
        let response = request
            .send()
            .await
            .map_err(|source| map_request_error(url, source))?;
        read_response(url, response).await
    }

    async fn get(
        &self,
        url: &str,
        query: &[(&str, &str)],
        authenticated: bool,
    ) -> Result<String, ApiError> {
        let mut request = self.http.get(url).query(query);
        if authenticated {
            if let Some(credential) = self.credential()? {
                request = request.bearer_auth(credential.expose());
            }
        }

        let response = request
            .send()
            .await
            .map_err(|source| map_request_error(url, source))?;
        read_response(url, response).await
    }
}

impl StreamSource for ApiClient {
    fn open_stream(&self, chat_id: &str, last_index: u64) -> ByteStream {
        let client = self.clone();
        let chat_id = chat_id.to_string();
        let connect = async move { client.connect_stream(&chat_id, last_index).await };
        Box::pin(stream::once(connect).try_flatten())
    }
}

impl ActionDispatcher for ApiClient {
    fn send_message<'a>(
        &'a self,
        chat_id: &'a str,
        prompt: &'a str,
    ) -> BoxFuture<'a, Result<(), ApiError>> {
        Box::pin(ApiClient::send_message(self, chat_id, prompt))
    }

    fn submit_decisions<'a>(
        &'a self,
        batch: &'a DecisionBatch,
    ) -> BoxFuture<'a, Result<(), ApiError>> {
        Box::pin(ApiClient::submit_decisions(self, batch))
    }

    fn stop<'a>(&'a self, chat_id: &'a str) -> BoxFuture<'a, Result<(), ApiError>> {
        Box::pin(ApiClient::stop(self, chat_id))
    }

    fn set_auto_approve<'a>(
        &'a self,
        chat_id: &'a str,
        enabled: bool,
    ) -> BoxFuture<'a, Result<bool, ApiError>> {
        Box::pin(ApiClient::set_auto_approve(self, chat_id, enabled))
    }

    fn share<'a>(
        &'a self,
        chat_id: &'a str,
        message_id: Option<&'a str>,
    ) -> BoxFuture<'a, Result<String, ApiError>> {
        Box::pin(ApiClient::share(self, chat_id, message_id))
    }
}

async fn read_response(url: &str, response: reqwest::Response) -> Result<String, ApiError> {
    let status = response.status();
    if is_auth_status(status) {
        return Err(AuthError::Rejected {
            status: status.as_u16(),
        }
        .into());
    }

    let body = response
        .text()
        .await
        .map_err(|source| map_request_error(url, source))?;
    if !status.is_success() {
        return Err(ApiError::Request {
            url: url.to_string(),
            status,
            body,
        });
    }
    Ok(body)
}

fn parse_body<T: DeserializeOwned>(url: &str, body: &str) -> Result<T, ApiError> {
    serde_json::from_str(body).map_err(|error| ApiError::Body {
        url: url.to_string(),
        detail: error.to_string(),
    })
}

fn map_request_error(url: &str, source: reqwest::Error) -> ApiError {
    if let Some(status) = source.status() {
        if is_auth_status(status) {
            return AuthError::Rejected {
                status: status.as_u16(),
            }
            .into();
        }
    }
    ApiError::Network {
        url: url.to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config(api_url: &str) -> Config {
        Config {
            api_url: api_url.to_string(),
            credential: Credential::new("token"),
            request_timeout: Duration::from_secs(5),
            list_poll_interval: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_endpoint_url_joins_without_double_slash() {
        let client = ApiClient::new(&config("http://localhost:8000/v1/")).expect("client");
        assert_eq!(
            client.endpoint_url("/chat/messages"),
            "http://localhost:8000/v1/chat/messages"
        );
        assert_eq!(
            client.endpoint_url("chat/list"),
            "http://localhost:8000/v1/chat/list"
        );
    }

    #[tokio::test]
    async fn test_missing_credential_for_remote_endpoint_fails_before_any_request() {
        let client = ApiClient::new(&config("https://chat.example.com"))
            .expect("client")
            .with_credential(None);
        let error = client.stop("c1").await.expect_err("no credential");
        assert!(matches!(error, ApiError::Auth(AuthError::Missing)));

        let mut stream = client.open_stream("c1", 0);
        let first = stream.next().await.expect("stream yields the failure");
        assert_eq!(first, Err(TransportError::Auth(AuthError::Missing)));
    }
}
