use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::services::flashcards::FlashcardError;
use crate::services::llm_provider::UpstreamError;
use crate::services::structured::StructuredError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("API key is required")]
    AuthRequired,

    #[error("{0}")]
    InvalidInput(String),

    #[error("Only PDF files are allowed")]
    InvalidFileType,

    #[error("No text found in PDF")]
    EmptyDocument,

    #[error("No PDF uploaded. Please upload a PDF first.")]
    NoDocument,

    #[error("Text extraction failed: {0:#}")]
    Extraction(anyhow::Error),

    #[error("Flashcard generation failed: {0}")]
    Flashcards(#[from] FlashcardError),

    #[error("Structured response failed: {0}")]
    Structured(#[from] StructuredError),

    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),
}

#[derive(Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ErrorResponse {
    pub error: String,
    pub status: u16,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::AuthRequired
            | AppError::InvalidFileType
            | AppError::EmptyDocument
            | AppError::NoDocument => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Extraction(e) => {
                tracing::error!("PDF extraction failed: {e:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to extract text from PDF".to_string(),
                )
            }
            AppError::Flashcards(e) => {
                match e {
                    FlashcardError::UpstreamEmptyResponse => {
                        tracing::error!("Flashcard generation: upstream returned no content");
                    }
                    FlashcardError::MalformedJson(detail) => {
                        tracing::error!("Flashcard generation: malformed JSON from upstream: {detail}");
                    }
                }
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Flashcard generation failed".to_string(),
                )
            }
            AppError::Structured(e) => {
                tracing::error!("Structured chat: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to parse structured response".to_string(),
                )
            }
            AppError::Upstream(e) => {
                tracing::error!("Upstream error: {e}");
                let status = match e {
                    e if e.is_quota_exhausted() => StatusCode::PAYMENT_REQUIRED,
                    UpstreamError::Api { status: 401, .. } => StatusCode::UNAUTHORIZED,
                    UpstreamError::Api { status: 429, .. } => StatusCode::TOO_MANY_REQUESTS,
                    UpstreamError::Timeout => StatusCode::GATEWAY_TIMEOUT,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.client_message().to_string())
            }
        };

        let body = axum::Json(ErrorResponse {
            error: message,
            status: status.as_u16(),
        });

        (status, body).into_response()
    }
}
