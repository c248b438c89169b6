use axum::{Json, extract::State};
use serde::Serialize;

use crate::errors::AppError;
use crate::middleware::auth::ApiKey;
use crate::services::llm_provider::{CompletionRequest, PromptMessage, UpstreamError};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ValidateKeyResponse {
    pub status: String,
    pub message: String,
    pub model_tested: String,
}

/// Checks the caller's key with the cheapest possible completion.
#[cfg_attr(feature = "openapi", utoipa::path(post, path = "/api/validate-key", tag = "Keys", security(("bearer_auth" = [])), responses((status = 200, body = ValidateKeyResponse), (status = 400, body = crate::errors::ErrorResponse), (status = 401, body = crate::errors::ErrorResponse))))]
pub async fn validate_key(
    State(state): State<AppState>,
    api_key: ApiKey,
) -> Result<Json<ValidateKeyResponse>, AppError> {
    let model = state.config.llm.default_model.clone();

    let mut request = CompletionRequest::new(model.clone(), vec![PromptMessage::user("Hello")]);
    request.max_tokens = Some(5);

    tokio::time::timeout(
        state.config.llm.request_timeout(),
        state.llm.complete(api_key.as_str(), request),
    )
    .await
    .map_err(|_| UpstreamError::Timeout)??;

    Ok(Json(ValidateKeyResponse {
        status: "valid".to_string(),
        message: "API key is valid and working".to_string(),
        model_tested: model,
    }))
}
