use axum::response::sse::Event;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ChatRequest {
    #[serde(default)]
    pub user_message: String,
    pub developer_message: Option<String>,
    pub model: Option<String>,
}

/// A retrieved chunk that grounded an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Citation {
    pub chunk: usize,
    pub score: usize,
    pub preview: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// Conversation log entry as kept by the client. The server never stores
/// these; the type is exported for API consumers, and `citations` is filled
/// from the stream's `control` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citations: Option<Vec<Citation>>,
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            citations: None,
        }
    }

    pub fn with_citations(mut self, citations: Vec<Citation>) -> Self {
        self.citations = Some(citations);
        self
    }
}

/// One server-sent event of the chat stream.
///
/// Tokens use the default event type so plain `data:` readers keep working;
/// everything else is tagged with an `event:` name.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Control { citations: Vec<Citation> },
    Token(String),
    Done,
    Error(String),
}

#[derive(Serialize)]
struct TokenPayload<'a> {
    content: &'a str,
}

#[derive(Serialize)]
struct ControlPayload<'a> {
    citations: &'a [Citation],
}

#[derive(Serialize)]
struct ErrorPayload<'a> {
    error: &'a str,
}

impl StreamEvent {
    pub fn into_sse(self) -> Event {
        let event = match &self {
            StreamEvent::Token(content) => Event::default().json_data(TokenPayload { content }),
            StreamEvent::Control { citations } => Event::default()
                .event("control")
                .json_data(ControlPayload { citations }),
            StreamEvent::Error(error) => Event::default()
                .event("error")
                .json_data(ErrorPayload { error }),
            StreamEvent::Done => return Event::default().data("[DONE]"),
        };

        event.unwrap_or_else(|e| {
            tracing::error!("Failed to encode stream event: {e}");
            Event::default()
                .event("error")
                .data(r#"{"error":"Chat failed"}"#)
        })
    }
}
