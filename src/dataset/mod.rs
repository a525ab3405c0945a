//! Benchmark dataset adapters.
//!
//! Each adapter parses one dataset's on-disk JSON into [`TestCase`]s over
//! the unified model. Downloading datasets is out of scope; files are read
//! from disk.

pub mod convomem;
pub mod longmemeval;

use crate::model::Role;

/// Map a raw role string to a [`Role`], defaulting to `user` like the
/// datasets themselves do for missing or unknown roles.
pub(crate) fn role_from_str(raw: Option<&str>) -> Role {
    match raw {
        Some("assistant") => Role::Assistant,
        Some("system") => Role::System,
        _ => Role::User,
    }
}

/// Render a gold answer that may be a string or a number in the raw data
pub(crate) fn answer_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
