use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub rag: RagConfig,
    pub upload: UploadConfig,
    pub flashcards: FlashcardConfig,
    pub sessions: SessionConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API, without the `/chat/completions` suffix.
    pub base_url: String,
    pub default_model: String,
    pub default_system_prompt: String,
    pub request_timeout_secs: u64,
    pub stream_idle_timeout_secs: u64,
}

impl LlmConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn stream_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_idle_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RagConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    pub max_file_size_mb: usize,
    pub extraction_timeout_secs: u64,
}

impl UploadConfig {
    pub fn max_file_size_bytes(&self) -> usize {
        self.max_file_size_mb * 1024 * 1024
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FlashcardConfig {
    pub count: usize,
    /// When false, a generic-knowledge prompt is used if the session has no document.
    pub require_document: bool,
    pub temperature: f32,
    /// Falls back to `llm.default_model` when unset.
    pub model: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    pub ttl_secs: u64,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let environment = std::env::var("RUN_ENV").unwrap_or_else(|_| "development".into());

        let config: Self = Config::builder()
            .add_source(File::with_name("config/default"))
            .add_source(File::with_name(&format!("config/{environment}")).required(false))
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rag.chunk_size == 0 {
            return Err(ConfigError::Message("rag.chunk_size must be positive".into()));
        }
        if self.rag.chunk_overlap >= self.rag.chunk_size {
            return Err(ConfigError::Message(format!(
                "rag.chunk_overlap ({}) must be smaller than rag.chunk_size ({})",
                self.rag.chunk_overlap, self.rag.chunk_size
            )));
        }
        if self.rag.top_k == 0 {
            return Err(ConfigError::Message("rag.top_k must be positive".into()));
        }
        if self.flashcards.count == 0 {
            return Err(ConfigError::Message("flashcards.count must be positive".into()));
        }
        Ok(())
    }
}
