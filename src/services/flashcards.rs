use crate::dto::flashcard::Flashcard;
use crate::services::llm_provider::{CompletionRequest, PromptMessage};

pub const SYSTEM_PROMPT: &str =
    "You are an educational assistant that creates high-quality flashcards from document content.";

#[derive(Debug, thiserror::Error)]
pub enum FlashcardError {
    #[error("upstream returned no content")]
    UpstreamEmptyResponse,

    #[error("malformed flashcard JSON: {0}")]
    MalformedJson(String),
}

/// Builds the user prompt asking for `count` question/answer pairs. Without a
/// document the model falls back to general knowledge.
pub fn build_prompt(document: Option<&str>, count: usize) -> String {
    let source = match document {
        Some(text) => format!(
            "Based on the following document content, generate {count} educational flashcards. \
             Each flashcard should have a clear question and a comprehensive answer.\n\n\
             Document content:\n{text}"
        ),
        None => format!(
            "No document has been provided. Generate {count} educational flashcards on \
             fundamental general-knowledge topics. Each flashcard should have a clear question \
             and a comprehensive answer."
        ),
    };

    format!(
        "{source}\n\n\
         Please format your response as a JSON array of exactly {count} objects with \"question\" \
         and \"answer\" fields. Respond with the JSON array only. Example:\n\
         [\n  {{\"question\": \"What is...?\", \"answer\": \"The answer is...\"}},\n  \
         {{\"question\": \"How does...?\", \"answer\": \"It works by...\"}}\n]"
    )
}

pub fn build_request(
    model: &str,
    document: Option<&str>,
    count: usize,
    temperature: f32,
) -> CompletionRequest {
    let mut request = CompletionRequest::new(
        model,
        vec![
            PromptMessage::system(SYSTEM_PROMPT),
            PromptMessage::user(build_prompt(document, count)),
        ],
    );
    request.temperature = Some(temperature);
    request
}

/// Parses the model reply. A surrounding markdown code fence is tolerated;
/// anything else must be a JSON array of complete cards.
pub fn parse_flashcards(content: Option<&str>) -> Result<Vec<Flashcard>, FlashcardError> {
    let content = content
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or(FlashcardError::UpstreamEmptyResponse)?;

    let cards: Vec<Flashcard> = serde_json::from_str(strip_code_fence(content))
        .map_err(|e| FlashcardError::MalformedJson(e.to_string()))?;

    if cards.is_empty() {
        return Err(FlashcardError::MalformedJson("empty flashcard array".into()));
    }

    if let Some(pos) = cards
        .iter()
        .position(|c| c.question.trim().is_empty() || c.answer.trim().is_empty())
    {
        return Err(FlashcardError::MalformedJson(format!(
            "flashcard {pos} has an empty question or answer"
        )));
    }

    Ok(cards)
}

fn strip_code_fence(content: &str) -> &str {
    let Some(rest) = content.strip_prefix("```") else {
        return content;
    };
    let Some(body) = rest.trim_end().strip_suffix("```") else {
        return content;
    };
    // Drop the info string ("json") on the opening fence line.
    match body.split_once('\n') {
        Some((_, inner)) => inner.trim(),
        None => body.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_array() {
        let cards = parse_flashcards(Some(
            r#"[{"question":"Q1","answer":"A1"},{"question":"Q2","answer":"A2"}]"#,
        ))
        .unwrap();
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[1].answer, "A2");
    }

    #[test]
    fn test_parse_fenced_array() {
        let reply = "```json\n[{\"question\":\"Q\",\"answer\":\"A\"}]\n```";
        let cards = parse_flashcards(Some(reply)).unwrap();
        assert_eq!(cards[0].question, "Q");

        let reply = "```\n[{\"question\":\"Q\",\"answer\":\"A\"}]\n```\n";
        assert_eq!(parse_flashcards(Some(reply)).unwrap().len(), 1);
    }

    #[test]
    fn test_empty_reply_is_distinguished() {
        assert!(matches!(
            parse_flashcards(None),
            Err(FlashcardError::UpstreamEmptyResponse)
        ));
        assert!(matches!(
            parse_flashcards(Some("  \n")),
            Err(FlashcardError::UpstreamEmptyResponse)
        ));
    }

    #[test]
    fn test_non_json_is_rejected() {
        let err = parse_flashcards(Some("Here are your flashcards: 1. What is Rust?")).unwrap_err();
        assert!(matches!(err, FlashcardError::MalformedJson(_)));
    }

    #[test]
    fn test_empty_array_and_blank_cards_are_rejected() {
        assert!(matches!(
            parse_flashcards(Some("[]")),
            Err(FlashcardError::MalformedJson(_))
        ));
        assert!(matches!(
            parse_flashcards(Some(r#"[{"question":"Q","answer":"  "}]"#)),
            Err(FlashcardError::MalformedJson(_))
        ));
        assert!(matches!(
            parse_flashcards(Some(r#"{"question":"Q","answer":"A"}"#)),
            Err(FlashcardError::MalformedJson(_))
        ));
    }

    #[test]
    fn test_prompt_includes_document_and_count() {
        let prompt = build_prompt(Some("Photosynthesis converts light."), 5);
        assert!(prompt.contains("generate 5 educational flashcards"));
        assert!(prompt.contains("Photosynthesis converts light."));
        assert!(prompt.contains("JSON array of exactly 5 objects"));

        let generic = build_prompt(None, 5);
        assert!(generic.contains("general-knowledge"));
        assert!(!generic.contains("Document content"));
    }

    #[test]
    fn test_request_uses_system_prompt_and_temperature() {
        let request = build_request("gpt-test", Some("text"), 5, 0.7);
        assert_eq!(request.model, "gpt-test");
        assert_eq!(request.messages[0], PromptMessage::system(SYSTEM_PROMPT));
        assert_eq!(request.temperature, Some(0.7));
    }
}
