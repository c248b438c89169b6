pub mod chat;
pub mod document;
pub mod flashcard;
pub mod structured;
