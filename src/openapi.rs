use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::dto::chat::{ChatRequest, Citation};
use crate::dto::document::{UploadForm, UploadResponse};
use crate::dto::flashcard::{Flashcard, FlashcardsResponse};
use crate::dto::structured::{
    CodeBlock, ListItem, StructuredAnswer, StructuredChatResponse, SummaryInfo,
};
use crate::errors::ErrorResponse;
use crate::routes::health::HealthResponse;
use crate::routes::keys::ValidateKeyResponse;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "CookiesPDF API",
        version = "0.1.0",
        description = "Chat with an upstream model, ground answers in an uploaded PDF, and generate flashcards. The bearer token is the caller's own upstream API key."
    ),
    modifiers(&SecurityAddon),
    paths(
        crate::routes::health::health_check,
        crate::routes::chat::chat,
        crate::routes::chat::chat_structured,
        crate::routes::documents::upload,
        crate::routes::flashcards::generate,
        crate::routes::keys::validate_key,
    ),
    components(
        schemas(
            ChatRequest, Citation,
            StructuredChatResponse, StructuredAnswer, SummaryInfo, CodeBlock, ListItem,
            UploadForm, UploadResponse,
            Flashcard, FlashcardsResponse,
            HealthResponse, ValidateKeyResponse,
            ErrorResponse,
        )
    ),
    tags(
        (name = "Health", description = "Health check"),
        (name = "Chat", description = "Streaming chat with optional document grounding"),
        (name = "Documents", description = "PDF upload"),
        (name = "Flashcards", description = "Flashcard generation"),
        (name = "Keys", description = "Upstream API key validation"),
    )
)]
pub struct ApiDoc;
