use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CodeBlock {
    pub language: String,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ListItem {
    pub content: String,
    /// Nesting depth, 0 for top-level items.
    #[serde(default)]
    pub level: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SummaryInfo {
    pub main_topic: String,
    pub key_points: Vec<String>,
    #[serde(default)]
    pub conclusion: Option<String>,
    #[serde(default)]
    pub who_what_where_when_why: Option<BTreeMap<String, String>>,
}

/// The JSON object the model is asked to produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct StructuredAnswer {
    /// Markdown body of the reply.
    pub content: String,
    #[serde(default)]
    pub code_blocks: Vec<CodeBlock>,
    #[serde(default)]
    pub lists: Vec<ListItem>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub structured_summary: Option<SummaryInfo>,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default = "default_task_type")]
    pub task_type: String,
}

fn default_task_type() -> String {
    "general".to_string()
}

/// Top-level fields mirror `structured_data` so clients can read either.
#[derive(Debug, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct StructuredChatResponse {
    #[serde(flatten)]
    pub answer: StructuredAnswer,
    pub structured_data: StructuredAnswer,
}

impl From<StructuredAnswer> for StructuredChatResponse {
    fn from(answer: StructuredAnswer) -> Self {
        Self {
            structured_data: answer.clone(),
            answer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answer_fills_optional_fields() {
        let answer: StructuredAnswer = serde_json::from_str(r#"{"content":"Hi"}"#).unwrap();
        assert_eq!(answer.task_type, "general");
        assert!(answer.code_blocks.is_empty());
        assert!(answer.structured_summary.is_none());
    }

    #[test]
    fn test_response_exposes_fields_twice() {
        let answer: StructuredAnswer =
            serde_json::from_str(r#"{"content":"Hi","task_type":"technical"}"#).unwrap();
        let value = serde_json::to_value(StructuredChatResponse::from(answer)).unwrap();

        assert_eq!(value["content"], "Hi");
        assert_eq!(value["task_type"], "technical");
        assert_eq!(value["structured_data"]["task_type"], "technical");
    }
}
