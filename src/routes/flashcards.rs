use axum::{Json, extract::State};

use crate::dto::flashcard::FlashcardsResponse;
use crate::errors::AppError;
use crate::middleware::auth::ApiKey;
use crate::middleware::session::SessionId;
use crate::services::flashcards;
use crate::services::llm_provider::UpstreamError;
use crate::state::AppState;

#[cfg_attr(feature = "openapi", utoipa::path(post, path = "/api/flashcards", tag = "Flashcards", security(("bearer_auth" = [])), params(("x-session-id" = Option<String>, Header, description = "Session whose document is used")), responses((status = 200, body = FlashcardsResponse), (status = 400, body = crate::errors::ErrorResponse), (status = 500, body = crate::errors::ErrorResponse))))]
pub async fn generate(
    State(state): State<AppState>,
    api_key: ApiKey,
    session: SessionId,
) -> Result<Json<FlashcardsResponse>, AppError> {
    let config = &state.config.flashcards;

    let document = match &session.0 {
        Some(id) => state.documents.get(id).await,
        None => None,
    };
    let source = document.as_deref().map(|d| d.text.as_str());

    if source.is_none() && config.require_document {
        return Err(AppError::NoDocument);
    }

    let model = config
        .model
        .as_deref()
        .unwrap_or(&state.config.llm.default_model);
    let request = flashcards::build_request(model, source, config.count, config.temperature);

    tracing::info!(model = %model, grounded = source.is_some(), "Generating flashcards");

    let reply = tokio::time::timeout(
        state.config.llm.request_timeout(),
        state.llm.complete(api_key.as_str(), request),
    )
    .await
    .map_err(|_| UpstreamError::Timeout)??;

    let cards = flashcards::parse_flashcards(reply.as_deref())?;

    if cards.len() != config.count {
        tracing::warn!(
            "Requested {} flashcards, upstream returned {}",
            config.count,
            cards.len()
        );
    }

    Ok(Json(FlashcardsResponse {
        flashcards: cards,
        success: true,
    }))
}
