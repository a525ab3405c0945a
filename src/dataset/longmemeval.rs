//! LongMemEval adapter.
//!
//! Each raw example carries a question, a gold answer and a haystack of
//! conversation sessions. Sessions are deduplicated by id within the
//! example; examples missing session ids get synthetic ones, which is
//! counted and warned about since it indicates a dataset problem.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use super::{answer_to_string, role_from_str};
use crate::error::{AppError, AppResult};
use crate::model::{parse_timestamp, Message, Session, TestCase, TestCaseKind};

/// One raw LongMemEval example
#[derive(Debug, Deserialize)]
#[allow(missing_docs)] // fields mirror the dataset JSON keys
pub struct RawExample {
    #[serde(default)]
    pub question_id: String,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub answer: serde_json::Value,
    #[serde(default)]
    pub question_type: Option<String>,
    #[serde(default)]
    pub haystack_sessions: Vec<Vec<RawTurn>>,
    #[serde(default)]
    pub haystack_session_ids: Vec<String>,
    #[serde(default)]
    pub haystack_dates: Vec<String>,
}

/// A turn is either a role/content object or a legacy `[user, assistant]`
/// string pair.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
#[allow(missing_docs)] // variants mirror the dataset JSON shapes
pub enum RawTurn {
    Object {
        #[serde(default)]
        role: Option<String>,
        #[serde(default)]
        content: String,
    },
    Pair(Vec<String>),
}

/// Load and parse a LongMemEval JSON file
pub fn load_file(path: &Path) -> AppResult<Vec<TestCase>> {
    let content = std::fs::read_to_string(path)?;
    let examples: Vec<RawExample> =
        serde_json::from_str(&content).map_err(|e| AppError::Adapter {
            message: format!("Failed to parse LongMemEval data: {}", e),
        })?;
    Ok(parse(examples))
}

/// Convert raw examples into test cases
pub fn parse(examples: Vec<RawExample>) -> Vec<TestCase> {
    let mut cases = Vec::new();
    let mut missing_id_count = 0usize;

    for (example_index, example) in examples.into_iter().enumerate() {
        let mut sessions = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for (i, raw_session) in example.haystack_sessions.into_iter().enumerate() {
            let session_id = match example.haystack_session_ids.get(i) {
                Some(id) => id.clone(),
                None => {
                    missing_id_count += 1;
                    format!("session_{}", i)
                }
            };

            if !seen.insert(session_id.clone()) {
                continue;
            }

            let timestamp = example
                .haystack_dates
                .get(i)
                .and_then(|raw| parse_timestamp(&strip_weekday(raw)));

            let mut messages = Vec::new();
            for turn in raw_session {
                match turn {
                    RawTurn::Object { role, content } => {
                        let mut message =
                            Message::new(role_from_str(role.as_deref()), content);
                        message.timestamp = timestamp;
                        messages.push(message);
                    }
                    RawTurn::Pair(pair) if pair.len() >= 2 => {
                        messages.push(Message::user(pair[0].clone()));
                        messages.push(Message::assistant(pair[1].clone()));
                    }
                    RawTurn::Pair(_) => {}
                }
            }

            if !messages.is_empty() {
                let mut session = Session::new(session_id, messages);
                session.timestamp = timestamp;
                sessions.push(session);
            }
        }

        let case_id = if example.question_id.is_empty() {
            format!("longmemeval_{}", example_index)
        } else {
            example.question_id
        };

        cases.push(TestCase {
            id: case_id,
            category: example
                .question_type
                .unwrap_or_else(|| "unknown".to_string()),
            sessions,
            kind: TestCaseKind::Benchmark {
                question: example.question,
                gold_answer: answer_to_string(&example.answer),
            },
        });
    }

    if missing_id_count > 0 {
        warn!(missing_id_count, "Sessions missing ids, used synthetic ids");
    }

    cases
}

/// LongMemEval dates look like `2023/05/20 (Sat) 02:21`; drop the
/// parenthesized weekday before parsing.
fn strip_weekday(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_parens = false;
    for c in raw.chars() {
        match c {
            '(' => in_parens = true,
            ')' => in_parens = false,
            _ if !in_parens => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;

    fn example_json() -> serde_json::Value {
        serde_json::json!([{
            "question_id": "q-1",
            "question": "What instrument does the user play?",
            "answer": "cello",
            "question_type": "single-session-user",
            "haystack_session_ids": ["s-1", "s-1", "s-2"],
            "haystack_dates": ["2023/05/20 (Sat) 02:21", "2023/05/20 (Sat) 02:21", "2023/06/01 (Thu) 10:00"],
            "haystack_sessions": [
                [{"role": "user", "content": "I started cello lessons"},
                 {"role": "assistant", "content": "Great choice!"}],
                [{"role": "user", "content": "repeat of s-1"}],
                [{"role": "user", "content": "Unrelated chat"}]
            ]
        }])
    }

    #[test]
    fn test_parse_dedupes_sessions_by_id() {
        let examples: Vec<RawExample> = serde_json::from_value(example_json()).unwrap();
        let cases = parse(examples);

        assert_eq!(cases.len(), 1);
        let case = &cases[0];
        assert_eq!(case.id, "q-1");
        assert_eq!(case.category, "single-session-user");
        // The duplicated s-1 is dropped.
        assert_eq!(case.sessions.len(), 2);
        assert_eq!(case.sessions[0].session_id, "s-1");
        assert_eq!(case.sessions[0].messages[0].role, Role::User);
        assert!(case.sessions[0].timestamp.is_some());
    }

    #[test]
    fn test_parse_legacy_pair_turns() {
        let json = serde_json::json!([{
            "question_id": "q-2",
            "question": "q",
            "answer": 7,
            "haystack_session_ids": ["s-1"],
            "haystack_sessions": [[["hello", "hi there"]]]
        }]);
        let examples: Vec<RawExample> = serde_json::from_value(json).unwrap();
        let cases = parse(examples);

        let messages = &cases[0].sessions[0].messages;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].role, Role::Assistant);
        match &cases[0].kind {
            TestCaseKind::Benchmark { gold_answer, .. } => assert_eq!(gold_answer, "7"),
            other => panic!("expected benchmark kind, got {:?}", other),
        }
    }

    #[test]
    fn test_strip_weekday() {
        assert_eq!(strip_weekday("2023/05/20 (Sat) 02:21"), "2023/05/20 02:21");
        assert_eq!(strip_weekday("2023/05/20 02:21"), "2023/05/20 02:21");
    }

    #[test]
    fn test_synthetic_ids_for_missing_sessions() {
        let json = serde_json::json!([{
            "question": "q",
            "answer": "a",
            "haystack_sessions": [[{"role": "user", "content": "hi"}]]
        }]);
        let examples: Vec<RawExample> = serde_json::from_value(json).unwrap();
        let cases = parse(examples);
        assert_eq!(cases[0].sessions[0].session_id, "session_0");
        assert_eq!(cases[0].id, "longmemeval_0");
    }
}
