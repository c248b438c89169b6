use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{self, Stream, StreamExt};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use crate::dto::chat::{ChatRequest, Citation, StreamEvent};
use crate::dto::structured::StructuredChatResponse;
use crate::errors::AppError;
use crate::middleware::auth::ApiKey;
use crate::middleware::session::SessionId;
use crate::services::llm_provider::{
    CompletionRequest, CompletionService, PromptMessage, TokenStream, UpstreamError,
};
use crate::services::{retrieval, structured};
use crate::state::AppState;

pub const GROUNDING_INSTRUCTION: &str = "IMPORTANT: You must ONLY answer questions using information from the provided context below. If the answer is not in the context, say \"I don't have enough information in the provided document to answer that question.\"";

const PREVIEW_CHARS: usize = 120;

/// Appends the grounding instruction and the best matching chunks to `base`.
/// With no chunks the base prompt is returned unchanged.
pub fn build_system_prompt(
    base: &str,
    query: &str,
    chunks: &[String],
    top_k: usize,
) -> (String, Vec<Citation>) {
    if chunks.is_empty() {
        return (base.to_string(), Vec::new());
    }

    let ranked: Vec<_> = retrieval::rank_scored(query, chunks)
        .into_iter()
        .take(top_k)
        .collect();

    let context = ranked
        .iter()
        .map(|s| chunks[s.index].as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    let citations = ranked
        .iter()
        .map(|s| Citation {
            chunk: s.index,
            score: s.score,
            preview: chunks[s.index].chars().take(PREVIEW_CHARS).collect(),
        })
        .collect();

    (
        format!("{base}\n\n{GROUNDING_INSTRUCTION}\n\nContext:\n{context}"),
        citations,
    )
}

#[cfg_attr(feature = "openapi", utoipa::path(post, path = "/api/chat", tag = "Chat", security(("bearer_auth" = [])), params(("x-session-id" = Option<String>, Header, description = "Session returned by the upload endpoint")), request_body = ChatRequest, responses((status = 200, description = "SSE stream of {\"content\"} fragments terminated by [DONE]", content_type = "text/event-stream"), (status = 400, body = crate::errors::ErrorResponse))))]
pub async fn chat(
    State(state): State<AppState>,
    api_key: ApiKey,
    session: SessionId,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let turn = prepare_turn(&state, &session, payload).await?;

    tracing::info!(
        model = %turn.model,
        grounded = !turn.citations.is_empty(),
        "Relaying chat completion"
    );

    let request = CompletionRequest::new(
        turn.model,
        vec![
            PromptMessage::system(turn.system_prompt),
            PromptMessage::user(turn.user_message),
        ],
    );
    let citations = turn.citations;

    let control = (!citations.is_empty()).then_some(StreamEvent::Control { citations });

    let timeouts = RelayTimeouts {
        connect: state.config.llm.request_timeout(),
        idle: state.config.llm.stream_idle_timeout(),
    };

    let events = stream::iter(control)
        .chain(relay(state.llm.clone(), api_key, request, timeouts))
        .map(|event| Ok(event.into_sse()));

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// Non-streaming chat whose reply follows the structured answer schema.
#[cfg_attr(feature = "openapi", utoipa::path(post, path = "/api/chat/structured", tag = "Chat", security(("bearer_auth" = [])), params(("x-session-id" = Option<String>, Header, description = "Session returned by the upload endpoint")), request_body = ChatRequest, responses((status = 200, body = StructuredChatResponse), (status = 400, body = crate::errors::ErrorResponse), (status = 500, body = crate::errors::ErrorResponse))))]
pub async fn chat_structured(
    State(state): State<AppState>,
    api_key: ApiKey,
    session: SessionId,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<StructuredChatResponse>, AppError> {
    let turn = prepare_turn(&state, &session, payload).await?;

    tracing::info!(
        model = %turn.model,
        grounded = !turn.citations.is_empty(),
        "Requesting structured chat completion"
    );

    let request = structured::build_request(
        &turn.model,
        structured::system_prompt(&turn.system_prompt),
        turn.user_message,
    );

    let reply = tokio::time::timeout(
        state.config.llm.request_timeout(),
        state.llm.complete(api_key.as_str(), request),
    )
    .await
    .map_err(|_| UpstreamError::Timeout)??;

    let answer = structured::parse_answer(reply.as_deref())?;
    Ok(Json(answer.into()))
}

/// A validated chat request with its system prompt resolved.
struct Turn {
    model: String,
    system_prompt: String,
    user_message: String,
    citations: Vec<Citation>,
}

async fn prepare_turn(
    state: &AppState,
    session: &SessionId,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Turn, AppError> {
    let Json(payload) = payload.map_err(|e| AppError::InvalidInput(e.body_text()))?;

    if payload.user_message.trim().is_empty() {
        return Err(AppError::InvalidInput("Message cannot be empty".to_string()));
    }

    let base_prompt = payload
        .developer_message
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| state.config.llm.default_system_prompt.clone());

    let model = payload
        .model
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| state.config.llm.default_model.clone());

    let document = match &session.0 {
        Some(id) => state.documents.get(id).await,
        None => None,
    };

    let (system_prompt, citations) = match &document {
        Some(doc) => build_system_prompt(
            &base_prompt,
            &payload.user_message,
            &doc.chunks,
            state.config.rag.top_k,
        ),
        None => (base_prompt, Vec::new()),
    };

    Ok(Turn {
        model,
        system_prompt,
        user_message: payload.user_message,
        citations,
    })
}

#[derive(Debug, Clone, Copy)]
pub struct RelayTimeouts {
    /// Bound on the upstream accepting the request.
    pub connect: Duration,
    /// Bound on the wait for each subsequent fragment.
    pub idle: Duration,
}

enum RelayState {
    Connecting {
        llm: Arc<dyn CompletionService>,
        api_key: ApiKey,
        request: CompletionRequest,
    },
    Streaming(TokenStream),
    Finished,
}

/// Forwards upstream fragments as they arrive and ends with exactly one
/// terminal event: `Done` on completion, `Error` on failure or timeout.
///
/// The upstream stream is owned by the returned stream, so dropping it (for
/// example when the client disconnects) closes the upstream connection.
pub fn relay(
    llm: Arc<dyn CompletionService>,
    api_key: ApiKey,
    request: CompletionRequest,
    timeouts: RelayTimeouts,
) -> impl Stream<Item = StreamEvent> + Send {
    let initial = RelayState::Connecting {
        llm,
        api_key,
        request,
    };

    stream::unfold(initial, move |state| async move {
        match state {
            RelayState::Connecting {
                llm,
                api_key,
                request,
            } => {
                let opened =
                    tokio::time::timeout(timeouts.connect, llm.stream_chat(api_key.as_str(), request))
                        .await;
                match opened {
                    Ok(Ok(tokens)) => next_event(tokens, timeouts.idle).await,
                    Ok(Err(e)) => Some((upstream_failure(e), RelayState::Finished)),
                    Err(_) => Some((upstream_failure(UpstreamError::Timeout), RelayState::Finished)),
                }
            }
            RelayState::Streaming(tokens) => next_event(tokens, timeouts.idle).await,
            RelayState::Finished => None,
        }
    })
}

async fn next_event(mut tokens: TokenStream, idle: Duration) -> Option<(StreamEvent, RelayState)> {
    match tokio::time::timeout(idle, tokens.next()).await {
        Ok(Some(Ok(token))) => Some((StreamEvent::Token(token), RelayState::Streaming(tokens))),
        Ok(Some(Err(e))) => Some((upstream_failure(e), RelayState::Finished)),
        Ok(None) => Some((StreamEvent::Done, RelayState::Finished)),
        Err(_) => Some((upstream_failure(UpstreamError::Timeout), RelayState::Finished)),
    }
}

fn upstream_failure(e: UpstreamError) -> StreamEvent {
    tracing::error!("Chat stream failed: {e}");
    StreamEvent::Error(e.client_message().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct ScriptedLlm {
        tokens: Mutex<Option<Vec<Result<String, UpstreamError>>>>,
        open_error: Mutex<Option<UpstreamError>>,
        /// Keep the token stream open after the scripted tokens.
        stall: bool,
        /// Never answer the open request.
        hang_on_open: bool,
        /// Set when the returned token stream is dropped.
        dropped: Option<Arc<AtomicBool>>,
    }

    impl ScriptedLlm {
        fn tokens(tokens: Vec<Result<String, UpstreamError>>) -> Arc<Self> {
            Arc::new(Self {
                tokens: Mutex::new(Some(tokens)),
                ..Default::default()
            })
        }
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl CompletionService for ScriptedLlm {
        async fn stream_chat(
            &self,
            _api_key: &str,
            _request: CompletionRequest,
        ) -> Result<TokenStream, UpstreamError> {
            if self.hang_on_open {
                std::future::pending::<()>().await;
            }
            if let Some(e) = self.open_error.lock().unwrap().take() {
                return Err(e);
            }
            let tokens = self.tokens.lock().unwrap().take().unwrap_or_default();
            let mut stream: TokenStream = if self.stall {
                stream::iter(tokens).chain(stream::pending()).boxed()
            } else {
                stream::iter(tokens).boxed()
            };
            if let Some(flag) = &self.dropped {
                let guard = DropFlag(flag.clone());
                stream = stream
                    .map(move |token| {
                        let _guard = &guard;
                        token
                    })
                    .boxed();
            }
            Ok(stream)
        }

        async fn complete(
            &self,
            _api_key: &str,
            _request: CompletionRequest,
        ) -> Result<Option<String>, UpstreamError> {
            Ok(None)
        }
    }

    fn timeouts() -> RelayTimeouts {
        RelayTimeouts {
            connect: Duration::from_secs(5),
            idle: Duration::from_secs(5),
        }
    }

    async fn collect(llm: Arc<dyn CompletionService>) -> Vec<StreamEvent> {
        let request = CompletionRequest::new("m", vec![PromptMessage::user("hi")]);
        relay(llm, ApiKey("sk-test".into()), request, timeouts())
            .collect()
            .await
    }

    #[test]
    fn test_prompt_without_document_is_verbatim() {
        let (prompt, citations) = build_system_prompt("Be terse.", "anything", &[], 3);
        assert_eq!(prompt, "Be terse.");
        assert!(citations.is_empty());
    }

    #[test]
    fn test_prompt_with_document_appends_top_chunks() {
        let chunks: Vec<String> = [
            "Dogs bark loudly",
            "The cat sat on the mat",
            "A cat and a dog",
            "Birds sing",
            "cat sat cat",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let (prompt, citations) = build_system_prompt("Base.", "the cat sat", &chunks, 3);

        assert!(prompt.starts_with("Base.\n\n"));
        assert!(prompt.contains(GROUNDING_INSTRUCTION));
        assert!(prompt.ends_with(
            "Context:\nThe cat sat on the mat\n\ncat sat cat\n\nA cat and a dog"
        ));
        assert_eq!(
            citations.iter().map(|c| c.chunk).collect::<Vec<_>>(),
            vec![1, 4, 2]
        );
        assert_eq!(citations[0].score, 3);
    }

    #[tokio::test]
    async fn test_relay_forwards_tokens_in_order_then_done() {
        let llm = ScriptedLlm::tokens(vec![Ok("Hel".into()), Ok("lo".into())]);
        let events = collect(llm).await;
        assert_eq!(
            events,
            vec![
                StreamEvent::Token("Hel".into()),
                StreamEvent::Token("lo".into()),
                StreamEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_relay_keeps_partial_output_on_error() {
        let llm = ScriptedLlm::tokens(vec![
            Ok("partial".into()),
            Err(UpstreamError::Decode("boom".into())),
            Ok("never".into()),
        ]);
        let events = collect(llm).await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], StreamEvent::Token("partial".into()));
        assert!(matches!(events[1], StreamEvent::Error(_)));
    }

    #[tokio::test]
    async fn test_relay_reports_open_failure_as_error_event() {
        let llm = Arc::new(ScriptedLlm {
            open_error: Mutex::new(Some(UpstreamError::Api {
                status: 401,
                message: "bad key".into(),
            })),
            ..Default::default()
        });
        let events = collect(llm).await;
        assert_eq!(events.len(), 1);
        let StreamEvent::Error(message) = &events[0] else {
            panic!("expected error event, got {events:?}");
        };
        assert!(message.contains("Invalid API key"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_relay_times_out_idle_upstream() {
        let llm = Arc::new(ScriptedLlm {
            tokens: Mutex::new(Some(vec![Ok("first".into())])),
            stall: true,
            ..Default::default()
        });
        let events = collect(llm).await;
        assert_eq!(
            events,
            vec![
                StreamEvent::Token("first".into()),
                StreamEvent::Error(UpstreamError::Timeout.client_message().into()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_relay_times_out_unanswered_open() {
        let llm = Arc::new(ScriptedLlm {
            hang_on_open: true,
            ..Default::default()
        });
        let started = tokio::time::Instant::now();
        let events = collect(llm).await;

        assert_eq!(
            events,
            vec![StreamEvent::Error(
                UpstreamError::Timeout.client_message().into()
            )]
        );
        assert!(started.elapsed() >= timeouts().connect);
    }

    #[tokio::test]
    async fn test_dropping_relay_releases_upstream_stream() {
        let dropped = Arc::new(AtomicBool::new(false));
        let llm = Arc::new(ScriptedLlm {
            tokens: Mutex::new(Some(vec![Ok("first".into())])),
            stall: true,
            dropped: Some(dropped.clone()),
            ..Default::default()
        });
        let request = CompletionRequest::new("m", vec![PromptMessage::user("hi")]);
        let mut events = Box::pin(relay(llm, ApiKey("sk-test".into()), request, timeouts()));

        assert_eq!(
            events.next().await,
            Some(StreamEvent::Token("first".into()))
        );
        assert!(!dropped.load(Ordering::SeqCst));

        drop(events);
        assert!(dropped.load(Ordering::SeqCst));
    }
}
