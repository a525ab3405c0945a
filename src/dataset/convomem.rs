//! ConvoMem adapter.
//!
//! Each raw example is one question over one conversation. The category
//! taxonomy includes `abstention` cases where correct behavior is answering
//! without memory support.

use std::path::Path;

use serde::Deserialize;

use super::{answer_to_string, role_from_str};
use crate::error::{AppError, AppResult};
use crate::model::{Message, Session, TestCase, TestCaseKind};

/// One raw ConvoMem example
#[derive(Debug, Deserialize)]
#[allow(missing_docs)] // fields mirror the dataset JSON keys
pub struct RawExample {
    #[serde(default, alias = "question_id")]
    pub id: String,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub answer: serde_json::Value,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default, alias = "messages")]
    pub conversation: Vec<RawMessage>,
}

/// One raw conversation message
#[derive(Debug, Deserialize)]
#[allow(missing_docs)] // fields mirror the dataset JSON keys
pub struct RawMessage {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: String,
}

/// Load and parse a ConvoMem JSON file
pub fn load_file(path: &Path) -> AppResult<Vec<TestCase>> {
    let content = std::fs::read_to_string(path)?;
    let examples: Vec<RawExample> =
        serde_json::from_str(&content).map_err(|e| AppError::Adapter {
            message: format!("Failed to parse ConvoMem data: {}", e),
        })?;
    Ok(parse(examples))
}

/// Convert raw examples into test cases
pub fn parse(examples: Vec<RawExample>) -> Vec<TestCase> {
    examples
        .into_iter()
        .enumerate()
        .map(|(i, example)| {
            let case_id = if example.id.is_empty() {
                format!("convomem_{}", i)
            } else {
                example.id
            };

            let session_id = example
                .conversation_id
                .unwrap_or_else(|| format!("{}-conversation", case_id));

            let messages: Vec<Message> = example
                .conversation
                .into_iter()
                .filter(|m| !m.content.is_empty())
                .map(|m| Message::new(role_from_str(m.role.as_deref()), m.content))
                .collect();

            let sessions = if messages.is_empty() {
                Vec::new()
            } else {
                vec![Session::new(session_id, messages)]
            };

            TestCase {
                id: case_id,
                category: example.category.unwrap_or_else(|| "unknown".to_string()),
                sessions,
                kind: TestCaseKind::Benchmark {
                    question: example.question,
                    gold_answer: answer_to_string(&example.answer),
                },
            }
        })
        .collect()
}
