//! Client for the upstream chat-completion API.
//!
//! The service speaks the OpenAI-compatible `/chat/completions` wire format.
//! The caller's bearer token is forwarded per request and never retained.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::config::LlmConfig;

/// Incremental content fragments in arrival order.
pub type TokenStream = BoxStream<'static, Result<String, UpstreamError>>;

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("upstream response could not be decoded: {0}")]
    Decode(String),

    #[error("upstream reported an error mid-stream: {0}")]
    Rejected(String),

    #[error("upstream timed out")]
    Timeout,
}

impl UpstreamError {
    /// OpenAI reports an exhausted balance as a 429 carrying the
    /// `insufficient_quota` code, so it has to be told apart from rate limiting.
    pub fn is_quota_exhausted(&self) -> bool {
        match self {
            UpstreamError::Api { message, .. } | UpstreamError::Rejected(message) => {
                message.contains("insufficient_quota")
            }
            _ => false,
        }
    }

    /// Message safe to show to the client.
    pub fn client_message(&self) -> &'static str {
        if self.is_quota_exhausted() {
            return "Insufficient API quota. Please check your account billing.";
        }
        match self {
            UpstreamError::Api { status: 401, .. } => {
                "Invalid API key. Please check your API key and try again."
            }
            UpstreamError::Api { status: 429, .. } => "Rate limit exceeded. Please try again later.",
            UpstreamError::Timeout => "Upstream request timed out",
            _ => "Upstream request failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: Role,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<PromptMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Passed through as the upstream `response_format` (e.g. a JSON schema).
    pub response_format: Option<serde_json::Value>,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<PromptMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
            response_format: None,
        }
    }
}

#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Opens a streaming completion. Resolves once the upstream has accepted
    /// the request; fragments then arrive through the returned stream.
    async fn stream_chat(
        &self,
        api_key: &str,
        request: CompletionRequest,
    ) -> Result<TokenStream, UpstreamError>;

    /// Non-streaming completion. `Ok(None)` means the upstream answered
    /// without any message content.
    async fn complete(
        &self,
        api_key: &str,
        request: CompletionRequest,
    ) -> Result<Option<String>, UpstreamError>;
}

pub struct OpenAiCompatible {
    client: Client,
    base_url: String,
}

impl OpenAiCompatible {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn send(
        &self,
        api_key: &str,
        request: &CompletionRequest,
        stream: bool,
    ) -> Result<reqwest::Response, UpstreamError> {
        let body = ApiRequest {
            model: &request.model,
            messages: &request.messages,
            stream,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: request.response_format.as_ref(),
        };

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(UpstreamError::Api { status, message });
        }

        Ok(resp)
    }
}

#[async_trait]
impl CompletionService for OpenAiCompatible {
    async fn stream_chat(
        &self,
        api_key: &str,
        request: CompletionRequest,
    ) -> Result<TokenStream, UpstreamError> {
        let resp = self.send(api_key, &request, true).await?;
        tracing::debug!(model = %request.model, "upstream stream opened");

        let body = resp
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(UpstreamError::from))
            .boxed();

        Ok(token_stream(body))
    }

    async fn complete(
        &self,
        api_key: &str,
        request: CompletionRequest,
    ) -> Result<Option<String>, UpstreamError> {
        let resp = self.send(api_key, &request, false).await?;

        let data: ApiResponse = resp
            .json()
            .await
            .map_err(|e| UpstreamError::Decode(e.to_string()))?;

        Ok(data
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.is_empty()))
    }
}

#[derive(Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: &'a [PromptMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<&'a serde_json::Value>,
}

#[derive(Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Deserialize)]
struct ApiMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiStreamResponse {
    choices: Vec<ApiStreamChoice>,
}

#[derive(Deserialize)]
struct ApiStreamChoice {
    delta: ApiDelta,
}

#[derive(Deserialize)]
struct ApiDelta {
    content: Option<String>,
}

/// In-band failure, e.g. `{"error":{"message":"...","code":"server_error"}}`.
#[derive(Deserialize)]
struct ApiStreamError {
    error: serde_json::Value,
}

#[derive(Debug, PartialEq)]
enum Frame {
    Data(String),
    Done,
}

/// Splits an SSE byte stream into `data:` payloads. Bytes are buffered until a
/// full line is available so multi-byte characters split across network
/// chunks decode correctly.
#[derive(Default)]
struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    fn push(&mut self, bytes: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(bytes);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim();

            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim_start();
            if data == "[DONE]" {
                frames.push(Frame::Done);
            } else if !data.is_empty() {
                frames.push(Frame::Data(data.to_string()));
            }
        }
        frames
    }
}

/// Content carried by one `data:` payload. Frames without content are
/// skipped; an error object ends the stream.
fn delta_content(data: &str) -> Result<Option<String>, UpstreamError> {
    match serde_json::from_str::<ApiStreamResponse>(data) {
        Ok(parsed) => Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta.content)
            .filter(|c| !c.is_empty())),
        Err(e) => {
            if let Ok(failure) = serde_json::from_str::<ApiStreamError>(data) {
                return Err(UpstreamError::Rejected(failure.error.to_string()));
            }
            tracing::debug!("skipping unparseable stream frame: {e}");
            Ok(None)
        }
    }
}

struct Decoding {
    body: BoxStream<'static, Result<Vec<u8>, UpstreamError>>,
    decoder: FrameDecoder,
    pending: VecDeque<Result<String, UpstreamError>>,
    finished: bool,
}

fn token_stream(body: BoxStream<'static, Result<Vec<u8>, UpstreamError>>) -> TokenStream {
    let state = Decoding {
        body,
        decoder: FrameDecoder::default(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.pending.pop_front() {
                return Some((item, st));
            }
            if st.finished {
                return None;
            }

            match st.body.next().await {
                Some(Ok(bytes)) => {
                    for frame in st.decoder.push(&bytes) {
                        let Frame::Data(data) = frame else {
                            st.finished = true;
                            break;
                        };
                        match delta_content(&data) {
                            Ok(content) => st.pending.extend(content.map(Ok)),
                            Err(e) => {
                                st.pending.push_back(Err(e));
                                st.finished = true;
                                break;
                            }
                        }
                    }
                }
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(e), st));
                }
                // A body that closes before `[DONE]` was cut off.
                None => {
                    st.finished = true;
                    st.pending.push_back(Err(UpstreamError::Decode(
                        "stream ended without [DONE]".into(),
                    )));
                }
            }
        }
    })
    .boxed()
}
