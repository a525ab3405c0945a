use std::env;

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Memory backend endpoint
    pub provider: ProviderConfig,
    /// HTTP request behavior
    pub request: RequestConfig,
    /// Run-level orchestration settings
    pub run: RunConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

/// Memory provider endpoint configuration
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Base URL of the provider HTTP API
    pub base_url: String,
    /// Bearer token sent with every request, if set
    pub api_key: Option<String>,
}

/// HTTP request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,
    /// Retry attempts for transient failures
    pub max_retries: u32,
    /// Base delay between retries; doubles per attempt
    pub retry_delay_ms: u64,
}

/// Run-level orchestration configuration
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Max test cases in flight at once
    pub concurrency: usize,
    /// Wall-clock budget per case in milliseconds
    pub case_budget_ms: u64,
    /// Budget for the index-wait phase in milliseconds
    pub index_budget_ms: u64,
    /// Poll interval for asynchronous indexing backends
    pub index_poll_ms: u64,
    /// Bounded case-level retries on connection faults before erroring
    pub max_case_retries: u32,
    /// Result limit passed to provider searches
    pub search_limit: usize,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Tracing filter directive (e.g. `info`, `membench=debug`)
    pub level: String,
    /// Output format
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    /// Human-readable output
    Pretty,
    /// Structured JSON lines
    Json,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let provider = ProviderConfig {
            base_url: env::var("MEMBENCH_PROVIDER_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:18790".to_string()),
            api_key: env::var("MEMBENCH_API_KEY").ok().filter(|k| !k.is_empty()),
        };

        let request = RequestConfig {
            timeout_ms: env_parse("MEMBENCH_REQUEST_TIMEOUT_MS", 30000),
            max_retries: env_parse("MEMBENCH_MAX_RETRIES", 3),
            retry_delay_ms: env_parse("MEMBENCH_RETRY_DELAY_MS", 1000),
        };

        let run = RunConfig {
            concurrency: env_parse("MEMBENCH_CONCURRENCY", 10),
            case_budget_ms: env_parse("MEMBENCH_CASE_BUDGET_MS", 120_000),
            index_budget_ms: env_parse("MEMBENCH_INDEX_BUDGET_MS", 60_000),
            index_poll_ms: env_parse("MEMBENCH_INDEX_POLL_MS", 500),
            max_case_retries: env_parse("MEMBENCH_CASE_RETRIES", 1),
            search_limit: env_parse("MEMBENCH_SEARCH_LIMIT", 10),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        if run.concurrency == 0 {
            return Err(AppError::Config {
                message: "MEMBENCH_CONCURRENCY must be at least 1".to_string(),
            });
        }

        Ok(Config {
            provider,
            request,
            run,
            logging,
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30000,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            case_budget_ms: 120_000,
            index_budget_ms: 60_000,
            index_poll_ms: 500,
            max_case_retries: 1,
            search_limit: 10,
        }
    }
}
