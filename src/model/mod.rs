//! Unified data model shared by every dataset and scenario adapter.
//!
//! Adapters normalize heterogeneous inputs (benchmark JSON, scenario YAML)
//! into [`Session`]s and [`TestCase`]s; the orchestrator and classifier only
//! ever see these types.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Speaker role of a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System or framing instruction
    System,
    /// The end user
    User,
    /// The assistant side of the dialogue
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single conversation message. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Who is speaking
    pub role: Role,
    /// Optional named speaker, for multi-party sessions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    /// The message text
    pub content: String,
    /// When the message was said, if the source records it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Message {
    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a message with the given role
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            speaker: None,
            content: content.into(),
            timestamp: None,
        }
    }

    /// Render the message as a single memory line (`role: content`).
    pub fn render(&self) -> String {
        match &self.speaker {
            Some(speaker) => format!("{} ({}): {}", self.role, speaker, self.content),
            None => format!("{}: {}", self.role, self.content),
        }
    }
}

/// A conversation session: the unit of ingestion ordering.
///
/// Message order within a session is preserved during ingestion. Sessions of
/// the same case carry no mutual ordering guarantee; timestamps are passed
/// through untouched so providers can do temporal reasoning regardless of
/// ingestion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Source-assigned session id, unique within a case
    pub session_id: String,
    /// When the session took place, if the source records it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Messages in conversation order
    pub messages: Vec<Message>,
    /// Opaque adapter metadata, passed through to the provider
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Session {
    /// Create a session with an id and messages, no timestamp or metadata.
    pub fn new(session_id: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            session_id: session_id.into(),
            timestamp: None,
            messages,
            metadata: HashMap::new(),
        }
    }

    /// Set the session timestamp
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Parse a session timestamp from the formats adapters encounter.
///
/// Accepts RFC 3339 (`2024-01-15T10:30:00Z`), a bare datetime
/// (`2024-01-15 10:30:00`) or a bare date (`2024-01-15`, taken as UTC
/// midnight). Returns `None` for anything else; timestamps are optional
/// throughout the model.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&dt));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y/%m/%d %H:%M") {
        return Some(Utc.from_utc_datetime(&dt));
    }
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0).map(|dt| Utc.from_utc_datetime(&dt));
    }
    None
}

/// Opaque isolation namespace for one test case's memories.
///
/// Minted only by the container registry; at most one live holder per run
/// and never reused while memories under it remain unretired.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerTag(String);

impl ContainerTag {
    /// Wrap a raw tag string. Used by the registry and by tests.
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// The raw tag string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Provider-assigned ids for everything stored for a case.
///
/// `document_ids.len()` is at most the number of messages ingested: providers
/// may deduplicate and return the id of an equivalent pre-existing record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestResult {
    /// Provider-assigned ids of everything stored, deduped ids included
    pub document_ids: Vec<String>,
}

/// A single search hit, in provider-assigned relevance order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// Provider-assigned memory id
    pub id: String,
    /// The stored memory text
    pub content: String,
    /// Provider relevance score, higher is better
    pub score: f64,
    /// Opaque provider metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Declarative predicate over a generated answer. Stateless, evaluated once
/// per case; `not_contains` takes priority over `contains`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuccessCriteria {
    /// Terms the answer must include
    #[serde(default)]
    pub contains: Vec<String>,
    /// Terms the answer must not include; checked before `contains`
    #[serde(default)]
    pub not_contains: Vec<String>,
    /// Whether retrieval is expected to return anything at all
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub should_retrieve: Option<bool>,
}

/// A named failure category declared by a scenario.
///
/// `patterns` are matched against the retrieved content to attribute a
/// failure to this mode (e.g. superseded text retrieved despite being
/// outdated attributes to `stale_retrieval`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureMode {
    /// Mode name used in reports (e.g. `stale_retrieval`)
    pub label: String,
    /// Human-readable account of what going wrong this way means
    #[serde(default)]
    pub description: String,
    /// Substrings of retrieved content that attribute a failure to this mode
    #[serde(default)]
    pub patterns: Vec<String>,
}

/// What kind of evaluation a test case is
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TestCaseKind {
    /// A benchmark question with a gold answer
    Benchmark {
        /// The question posed to the provider
        question: String,
        /// The answer the dataset considers correct
        gold_answer: String,
    },
    /// A declarative task scenario with explicit success criteria
    Scenario {
        /// The task query issued against the provider
        task_query: String,
        /// Declarative predicate the answer is graded against
        criteria: SuccessCriteria,
        /// Failure categories declared by the scenario
        failure_modes: Vec<FailureMode>,
    },
}

impl TestCaseKind {
    /// The query issued against the provider for this case
    pub fn query(&self) -> &str {
        match self {
            TestCaseKind::Benchmark { question, .. } => question,
            TestCaseKind::Scenario { task_query, .. } => task_query,
        }
    }
}

/// The unit of evaluation. Owns exactly one container tag, created at case
/// start and cleared at case end, never shared with another case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    /// Source-assigned case id, unique within a run
    pub id: String,
    /// Dataset or scenario category, used for stratification and breakdowns
    pub category: String,
    /// Conversation history ingested before the query
    pub sessions: Vec<Session>,
    /// Benchmark question or declarative scenario
    pub kind: TestCaseKind,
}

/// Terminal classification of a test case. Set once and folded into the
/// aggregator exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    /// The answer satisfied the grading criteria
    Passed,
    /// Graded and found wrong; counts against accuracy
    Failed {
        /// Failure mode label (e.g. `wrong_answer`, `stale_retrieval`)
        mode: String,
        /// What specifically went wrong
        description: String,
    },
    /// Infrastructure fault; excluded from accuracy
    Errored {
        /// The underlying fault
        cause: String,
    },
}

impl Outcome {
    /// Build a failed outcome
    pub fn failed(mode: impl Into<String>, description: impl Into<String>) -> Self {
        Outcome::Failed {
            mode: mode.into(),
            description: description.into(),
        }
    }

    /// Whether the case passed
    pub fn is_pass(&self) -> bool {
        matches!(self, Outcome::Passed)
    }
}

/// Wall-clock spent in each phase of a case
#[derive(Debug, Clone, Copy, Default)]
pub struct CaseTimings {
    /// Time spent storing the case's sessions
    pub ingest: Duration,
    /// Time spent waiting for stored memories to become searchable
    pub index_wait: Duration,
    /// Time spent on the task query
    pub query: Duration,
}

/// Where the gold answer ranked in the retrieved results.
///
/// Computed for benchmark cases with a content-bearing gold answer; absent
/// for scenarios and abstention cases, where rank is meaningless.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetrievalRank {
    /// `1/(i+1)` for a first match at position `i`, `0.0` for no match
    pub reciprocal_rank: f64,
    /// Gold answer found in the top result
    pub hit_at_1: bool,
    /// Gold answer found within the top 5 results
    pub hit_at_5: bool,
    /// Gold answer found within the top 10 results
    pub hit_at_10: bool,
}

/// Everything the aggregator needs about one finished case
#[derive(Debug, Clone)]
pub struct CaseReport {
    /// Id of the test case this report describes
    pub case_id: String,
    /// Dataset or scenario category the case belongs to
    pub category: String,
    /// Terminal classification
    pub outcome: Outcome,
    /// Per-phase wall-clock; meaningful only for graded outcomes
    pub timings: CaseTimings,
    /// Top retrieved contents, kept for debugging failed cases
    pub retrieved: Vec<String>,
    /// The generated answer, absent when the case errored before grading
    pub answer: Option<String>,
    /// Retrieval-rank quality of the search results, where applicable
    pub rank: Option<RetrievalRank>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_render() {
        let msg = Message::user("I love hiking");
        assert_eq!(msg.render(), "user: I love hiking");

        let mut msg = Message::assistant("Noted!");
        msg.speaker = Some("Aria".to_string());
        assert_eq!(msg.render(), "assistant (Aria): Noted!");
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert!(parse_timestamp("2024-01-15T10:30:00Z").is_some());
        assert!(parse_timestamp("2024-01-15 10:30:00").is_some());
        assert!(parse_timestamp("2024/05/20 02:21").is_some());
        let midnight = parse_timestamp("2024-06-20").unwrap();
        assert_eq!(midnight.to_rfc3339(), "2024-06-20T00:00:00+00:00");
        assert!(parse_timestamp("last tuesday").is_none());
        assert!(parse_timestamp("").is_none());
    }

    #[test]
    fn test_role_serde_lowercase() {
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
        let role: Role = serde_json::from_str("\"user\"").unwrap();
        assert_eq!(role, Role::User);
    }

    #[test]
    fn test_outcome_serde_tagged() {
        let outcome = Outcome::failed("stale_retrieval", "old preference surfaced");
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["mode"], "stale_retrieval");
    }

    #[test]
    fn test_kind_query() {
        let kind = TestCaseKind::Benchmark {
            question: "Where does the user work?".to_string(),
            gold_answer: "Acme".to_string(),
        };
        assert_eq!(kind.query(), "Where does the user work?");
    }
}
