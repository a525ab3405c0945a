//! Error types and result aliases, layered by scope: application, provider
//! boundary, single case.

use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
#[allow(missing_docs)] // display strings double as the variant docs
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Case error: {0}")]
    Case(#[from] CaseError),

    #[error("Adapter error: {message}")]
    Adapter { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Errors at the provider HTTP boundary
#[derive(Debug, Error)]
#[allow(missing_docs)] // display strings double as the variant docs
pub enum ProviderError {
    #[error("Provider unreachable: {message} (retries: {retries})")]
    Connection { message: String, retries: u32 },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Indexing incomplete after {budget_ms}ms ({pending} ids pending)")]
    IndexingIncomplete { budget_ms: u64, pending: usize },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ProviderError {
    /// Whether this error means the backend itself is unreachable.
    ///
    /// Connection-class faults abort the whole case; everything else is a
    /// per-operation degradation the caller may swallow.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            ProviderError::Connection { .. }
                | ProviderError::Timeout { .. }
                | ProviderError::Http(_)
        )
    }
}

/// Infrastructure faults scoped to a single test case.
///
/// Kept distinct from graded failures: an errored case is an infrastructure
/// fault and is excluded from accuracy, a failed case is a wrong answer and
/// counts against it.
#[derive(Debug, Error)]
#[allow(missing_docs)] // display strings double as the variant docs
pub enum CaseError {
    #[error("Indexing did not complete within {budget_ms}ms")]
    IndexTimeout { budget_ms: u64 },

    #[error("Case exceeded wall-clock budget of {budget_ms}ms")]
    CaseTimeout { budget_ms: u64 },

    #[error("Answer generation or grading failed: {message}")]
    Grading { message: String },

    #[error("Container tag already in use: {tag}")]
    TagReuse { tag: String },

    #[error("Unknown or retired container tag: {tag}")]
    UnknownTag { tag: String },

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Result type alias for per-case operations
pub type CaseResult<T> = Result<T, CaseError>;
