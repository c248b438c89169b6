use anyhow::Context;
use tracing_subscriber::EnvFilter;

use cookiespdf_backend::config::AppConfig;
use cookiespdf_backend::routes;
use cookiespdf_backend::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::load().context("Failed to load configuration")?;
    tracing::info!(
        "Configuration loaded (env: {}, upstream: {})",
        std::env::var("RUN_ENV").unwrap_or_else(|_| "development".into()),
        config.llm.base_url
    );

    let state = AppState::new(config.clone());
    let app = routes::router(state);

    #[cfg(feature = "openapi")]
    let app = {
        use utoipa::OpenApi;
        use utoipa_redoc::{Redoc, Servable};
        app.merge(Redoc::with_url(
            "/redoc",
            cookiespdf_backend::openapi::ApiDoc::openapi(),
        ))
    };

    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("Starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}
