pub mod chat;
pub mod documents;
pub mod flashcards;
pub mod health;
pub mod keys;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Multipart framing overhead allowed on top of the file size limit.
const MULTIPART_SLACK_BYTES: usize = 64 * 1024;

pub fn router(state: AppState) -> Router {
    let body_limit = state.config.upload.max_file_size_bytes() + MULTIPART_SLACK_BYTES;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .route("/health", get(health::health_check))
        .route("/chat", post(chat::chat))
        .route("/chat/structured", post(chat::chat_structured))
        .route("/flashcards", post(flashcards::generate))
        .route("/validate-key", post(keys::validate_key))
        .route(
            "/upload-pdf",
            post(documents::upload).layer(DefaultBodyLimit::max(body_limit)),
        );

    Router::new()
        .nest("/api", api)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
