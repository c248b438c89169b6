use serde::Serialize;

use crate::services::store::Document;

#[derive(Debug, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct UploadResponse {
    pub message: String,
    pub success: bool,
    /// Echo this back in the `x-session-id` header on later requests.
    pub session_id: String,
    pub characters: usize,
    pub chunks: usize,
}

impl UploadResponse {
    pub fn new(session_id: String, document: &Document) -> Self {
        let characters = document.char_count();
        let chunks = document.chunks.len();

        Self {
            message: format!(
                "PDF uploaded successfully! Extracted {characters} characters and created {chunks} chunks."
            ),
            success: true,
            session_id,
            characters,
            chunks,
        }
    }
}

/// Multipart body accepted by the upload endpoint.
#[cfg(feature = "openapi")]
#[derive(utoipa::ToSchema)]
#[allow(dead_code)]
pub struct UploadForm {
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
}
