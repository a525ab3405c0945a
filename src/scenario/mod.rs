//! Scenario file loading.
//!
//! A scenario is a declarative YAML file: conversations to ingest, a task
//! query, expected behavior, success criteria and failure modes. Files are
//! parsed into the unified model so the orchestrator never sees YAML.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use crate::error::{AppError, AppResult};
use crate::model::{
    parse_timestamp, FailureMode, Message, Role, Session, SuccessCriteria, TestCase, TestCaseKind,
};

/// Raw scenario file schema
#[derive(Debug, Deserialize)]
pub struct ScenarioFile {
    /// Scenario name, used as the case id
    pub name: String,
    /// Category for stratification and breakdowns
    #[serde(default = "default_category")]
    pub category: String,
    /// Conversations ingested before the task query
    #[serde(default)]
    pub conversations: Vec<ConversationSpec>,
    /// The task to evaluate
    pub task: TaskSpec,
    /// Failure categories this scenario can attribute
    #[serde(default)]
    pub failure_modes: Vec<FailureModeSpec>,
}

fn default_category() -> String {
    "unknown".to_string()
}

/// One conversation in a scenario file
#[derive(Debug, Deserialize)]
pub struct ConversationSpec {
    /// Session id
    pub session: String,
    /// When the conversation took place, in any accepted timestamp format
    #[serde(default)]
    pub timestamp: Option<String>,
    /// Messages in conversation order
    #[serde(default)]
    pub messages: Vec<MessageSpec>,
}

/// One message in a scenario conversation
#[derive(Debug, Deserialize)]
pub struct MessageSpec {
    /// Who is speaking
    pub role: Role,
    /// The message text
    pub content: String,
    /// Optional named speaker
    #[serde(default)]
    pub speaker: Option<String>,
}

/// The task block of a scenario file
#[derive(Debug, Deserialize)]
pub struct TaskSpec {
    /// The query issued against the provider
    pub query: String,
    /// Expected retrieval behavior
    #[serde(default)]
    pub expected_behavior: ExpectedBehaviorSpec,
    /// Declarative success criteria over the answer
    #[serde(default)]
    pub success: SuccessSpec,
}

/// Expected retrieval behavior
#[derive(Debug, Default, Deserialize)]
pub struct ExpectedBehaviorSpec {
    /// Whether retrieval is expected to return anything at all
    #[serde(default)]
    pub should_retrieve: Option<bool>,
    /// Content that is stale/superseded and must not drive the answer;
    /// used as the match patterns for `stale_retrieval` failure modes.
    #[serde(default)]
    pub should_ignore: Vec<String>,
}

/// Declarative success criteria
#[derive(Debug, Default, Deserialize)]
pub struct SuccessSpec {
    /// Terms the answer must include
    #[serde(default, alias = "response_indicates")]
    pub contains: Vec<String>,
    /// Terms the answer must not include
    #[serde(default, alias = "response_does_not_indicate")]
    pub not_contains: Vec<String>,
}

/// A failure mode declared by a scenario
#[derive(Debug, Deserialize)]
pub struct FailureModeSpec {
    /// Mode name (`type` in YAML)
    #[serde(rename = "type")]
    pub kind: String,
    /// What going wrong this way means
    #[serde(default)]
    pub description: String,
    /// Retrieved-content substrings attributing a failure to this mode
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl ScenarioFile {
    /// Convert the parsed file into a test case
    pub fn into_test_case(self) -> TestCase {
        let sessions = self
            .conversations
            .into_iter()
            .map(|conv| {
                let timestamp = conv.timestamp.as_deref().and_then(parse_timestamp);
                let messages = conv
                    .messages
                    .into_iter()
                    .map(|m| Message {
                        role: m.role,
                        speaker: m.speaker,
                        content: m.content,
                        timestamp,
                    })
                    .collect();
                Session {
                    session_id: conv.session,
                    timestamp,
                    messages,
                    metadata: Default::default(),
                }
            })
            .collect();

        let should_ignore = self.task.expected_behavior.should_ignore;
        let failure_modes = self
            .failure_modes
            .into_iter()
            .map(|fm| {
                let mut patterns = fm.patterns;
                // Stale-retrieval modes match on the content the scenario
                // says must be ignored.
                if fm.kind == "stale_retrieval" && patterns.is_empty() {
                    patterns = should_ignore.clone();
                }
                FailureMode {
                    label: fm.kind,
                    description: fm.description,
                    patterns,
                }
            })
            .collect();

        let criteria = SuccessCriteria {
            contains: self.task.success.contains,
            not_contains: self.task.success.not_contains,
            should_retrieve: self.task.expected_behavior.should_retrieve,
        };

        TestCase {
            id: self.name,
            category: self.category,
            sessions,
            kind: TestCaseKind::Scenario {
                task_query: self.task.query,
                criteria,
                failure_modes,
            },
        }
    }
}

/// Load a single scenario file
pub fn load_file(path: &Path) -> AppResult<TestCase> {
    let content = std::fs::read_to_string(path)?;
    let file: ScenarioFile = serde_yaml::from_str(&content)?;
    Ok(file.into_test_case())
}

/// Load every scenario under a directory, recursively.
///
/// Files whose name starts with `_` are skipped (combined/generated files);
/// unparsable files are warned about and skipped rather than aborting the
/// run.
pub fn load_dir(dir: &Path) -> AppResult<Vec<TestCase>> {
    if !dir.is_dir() {
        return Err(AppError::Adapter {
            message: format!("Scenario directory not found: {}", dir.display()),
        });
    }

    let mut paths = Vec::new();
    collect_yaml_paths(dir, &mut paths)?;
    paths.sort();

    let mut cases = Vec::new();
    for path in paths {
        match load_file(&path) {
            Ok(case) => cases.push(case),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to load scenario, skipping");
            }
        }
    }
    Ok(cases)
}

fn collect_yaml_paths(dir: &Path, out: &mut Vec<PathBuf>) -> AppResult<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_yaml_paths(&path, out)?;
            continue;
        }

        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with('_') {
            continue;
        }
        if name.ends_with(".yaml") || name.ends_with(".yml") {
            out.push(path);
        }
    }
    Ok(())
}
