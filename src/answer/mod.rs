//! Answer-generation collaborator contract.
//!
//! The orchestrator hands retrieved context plus the case query to a
//! generator and gets natural-language text back; how the text is produced
//! is outside the engine. [`ExtractiveAnswerer`] is the built-in
//! implementation; LLM-backed generators plug in behind the same trait.

use async_trait::async_trait;

use crate::error::CaseResult;
use crate::model::SearchResult;

/// Synthesizes a natural-language response from retrieved context
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// Generate an answer to `query` given retrieved memories, relevance
    /// descending. An empty context must still produce text (an abstention).
    async fn generate(&self, query: &str, context: &[SearchResult]) -> CaseResult<String>;
}

/// Sentence emitted when no relevant memory was retrieved
pub const ABSTENTION_ANSWER: &str = "I don't have any relevant information about that.";

/// Answerer that composes a response directly from the top retrieved
/// memories, without an external model call.
pub struct ExtractiveAnswerer {
    max_snippets: usize,
}

impl ExtractiveAnswerer {
    /// Use at most `max_snippets` retrieved memories in the answer
    pub fn new(max_snippets: usize) -> Self {
        Self {
            max_snippets: max_snippets.max(1),
        }
    }
}

impl Default for ExtractiveAnswerer {
    fn default() -> Self {
        Self::new(3)
    }
}

#[async_trait]
impl AnswerGenerator for ExtractiveAnswerer {
    async fn generate(&self, _query: &str, context: &[SearchResult]) -> CaseResult<String> {
        if context.is_empty() {
            return Ok(ABSTENTION_ANSWER.to_string());
        }

        let snippets: Vec<&str> = context
            .iter()
            .take(self.max_snippets)
            .map(|r| r.content.as_str())
            .collect();

        Ok(format!("Based on what I remember: {}", snippets.join(" ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(content: &str, score: f64) -> SearchResult {
        SearchResult {
            id: format!("mem-{}", content.len()),
            content: content.to_string(),
            score,
            metadata: None,
        }
    }

    #[tokio::test]
    async fn test_empty_context_abstains() {
        let answerer = ExtractiveAnswerer::default();
        let answer = answerer.generate("Any dinner plans?", &[]).await.unwrap();
        assert_eq!(answer, ABSTENTION_ANSWER);
    }

    #[tokio::test]
    async fn test_answer_uses_top_snippets_only() {
        let answerer = ExtractiveAnswerer::new(2);
        let context = vec![
            hit("user: I became vegetarian", 0.9),
            hit("user: I like jazz", 0.8),
            hit("user: I once ate steak", 0.1),
        ];
        let answer = answerer.generate("Recommend dinner", &context).await.unwrap();
        assert!(answer.contains("vegetarian"));
        assert!(answer.contains("jazz"));
        assert!(!answer.contains("steak"));
    }
}
