pub mod flashcards;
pub mod llm_provider;
pub mod pdf;
pub mod retrieval;
pub mod store;
pub mod structured;
pub mod study;
