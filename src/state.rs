use crate::config::AppConfig;
use crate::services::llm_provider::{CompletionService, OpenAiCompatible};
use crate::services::pdf::{PdfTextExtractor, TextExtractor};
use crate::services::store::DocumentStore;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub documents: Arc<DocumentStore>,
    pub llm: Arc<dyn CompletionService>,
    pub extractor: Arc<dyn TextExtractor>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let llm = Arc::new(OpenAiCompatible::new(&config.llm));
        let extractor = Arc::new(PdfTextExtractor::new(Duration::from_secs(
            config.upload.extraction_timeout_secs,
        )));
        Self::with_services(config, llm, extractor)
    }

    pub fn with_services(
        config: AppConfig,
        llm: Arc<dyn CompletionService>,
        extractor: Arc<dyn TextExtractor>,
    ) -> Self {
        let documents = Arc::new(DocumentStore::new(Duration::from_secs(
            config.sessions.ttl_secs,
        )));

        Self {
            config: Arc::new(config),
            documents,
            llm,
            extractor,
        }
    }
}
