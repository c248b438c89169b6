use axum::{
    Json,
    extract::{Multipart, State},
};

use crate::dto::document::UploadResponse;
use crate::errors::AppError;
use crate::middleware::auth::ApiKey;
use crate::middleware::session::SessionId;
use crate::services::pdf;
use crate::services::store::Document;
use crate::state::AppState;

const FILE_FIELD: &str = "file";

#[cfg_attr(feature = "openapi", utoipa::path(post, path = "/api/upload-pdf", tag = "Documents", security(("bearer_auth" = [])), params(("x-session-id" = Option<String>, Header, description = "Session to replace the document of; a new one is created when absent")), request_body(content = crate::dto::document::UploadForm, content_type = "multipart/form-data"), responses((status = 200, body = UploadResponse), (status = 400, body = crate::errors::ErrorResponse))))]
pub async fn upload(
    State(state): State<AppState>,
    _api_key: ApiKey,
    session: SessionId,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let max_size = state.config.upload.max_file_size_bytes();

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidInput(format!("Invalid multipart data: {e}")))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        if !pdf::is_pdf_filename(&filename) {
            return Err(AppError::InvalidFileType);
        }

        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::InvalidInput(format!("Failed to read file: {e}")))?;

        upload = Some((filename, data));
        break;
    }

    let (filename, data) = upload.ok_or(AppError::InvalidFileType)?;

    if data.len() > max_size {
        return Err(AppError::InvalidInput(format!(
            "File too large. Maximum size is {} MB",
            state.config.upload.max_file_size_mb
        )));
    }

    let text = state
        .extractor
        .extract(data.to_vec())
        .await
        .map_err(AppError::Extraction)?;

    if text.trim().is_empty() {
        return Err(AppError::EmptyDocument);
    }

    let chunks = pdf::chunk_text(
        &text,
        state.config.rag.chunk_size,
        state.config.rag.chunk_overlap,
    );

    let session_id = session.or_new();
    let document = state
        .documents
        .replace(&session_id, Document::new(filename, text, chunks))
        .await;

    tracing::info!(
        session = %session_id,
        file = %document.filename,
        characters = document.char_count(),
        chunks = document.chunks.len(),
        "Document stored"
    );

    Ok(Json(UploadResponse::new(session_id, &document)))
}
