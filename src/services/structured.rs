//! Single-shot chat whose reply is constrained to a JSON schema.

use serde_json::{Value, json};

use crate::dto::structured::StructuredAnswer;
use crate::services::llm_provider::{CompletionRequest, PromptMessage};

const INSTRUCTIONS: &str = "You are a helpful AI assistant. Provide responses in the structured format requested.

## Task-Specific Instructions:

### For Summarization Tasks:
- Set task_type to \"summarization\"
- Provide a structured_summary with:
  - main_topic: The primary subject
  - key_points: 3-5 essential takeaways
  - conclusion: Main conclusion or final thought
  - who_what_where_when_why: 5W analysis if applicable
- Keep content concise (3-4 sentences max)
- Focus on who/what/where/when/why without extra background

### For Technical Tasks:
- Set task_type to \"technical\"
- Use 1 simple analogy + 1 concrete example
- Define jargon in plain words
- Extract code_blocks when applicable

### For General Tasks:
- Set task_type to \"general\"
- Use clean markdown formatting
- Provide direct answers when applicable";

#[derive(Debug, thiserror::Error)]
pub enum StructuredError {
    #[error("upstream returned no content")]
    UpstreamEmptyResponse,

    #[error("malformed structured JSON: {0}")]
    MalformedJson(String),
}

pub fn system_prompt(developer_message: &str) -> String {
    format!("{INSTRUCTIONS}\n\nDeveloper context: {developer_message}")
}

/// JSON schema for [`StructuredAnswer`], sent as the upstream `response_format`.
pub fn response_format() -> Value {
    let string = json!({ "type": "string" });
    let nullable_string = json!({ "type": ["string", "null"] });

    json!({
        "type": "json_schema",
        "json_schema": {
            "name": "structured_response",
            "strict": false,
            "schema": {
                "type": "object",
                "required": ["content"],
                "properties": {
                    "content": string,
                    "code_blocks": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "required": ["language", "code"],
                            "properties": { "language": string, "code": string }
                        }
                    },
                    "lists": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "required": ["content"],
                            "properties": {
                                "content": string,
                                "level": { "type": "integer", "minimum": 0 }
                            }
                        }
                    },
                    "summary": nullable_string,
                    "structured_summary": {
                        "type": ["object", "null"],
                        "required": ["main_topic", "key_points"],
                        "properties": {
                            "main_topic": string,
                            "key_points": { "type": "array", "items": string },
                            "conclusion": nullable_string,
                            "who_what_where_when_why": {
                                "type": ["object", "null"],
                                "additionalProperties": string
                            }
                        }
                    },
                    "answer": nullable_string,
                    "task_type": {
                        "type": "string",
                        "enum": ["general", "summarization", "technical", "creative", "math", "code"]
                    }
                }
            }
        }
    })
}

pub fn build_request(model: &str, system_prompt: String, user_message: String) -> CompletionRequest {
    let mut request = CompletionRequest::new(
        model,
        vec![
            PromptMessage::system(system_prompt),
            PromptMessage::user(user_message),
        ],
    );
    request.response_format = Some(response_format());
    request
}

pub fn parse_answer(content: Option<&str>) -> Result<StructuredAnswer, StructuredError> {
    let content = content
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or(StructuredError::UpstreamEmptyResponse)?;

    serde_json::from_str(content).map_err(|e| StructuredError::MalformedJson(e.to_string()))
}
