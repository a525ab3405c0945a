//! # Membench
//!
//! A benchmark orchestration and scenario-evaluation engine for
//! conversational-memory providers: services that store and retrieve
//! dialogue-derived facts over HTTP.
//!
//! ## Features
//!
//! - **Unified Data Model**: one session/message representation that every
//!   dataset and scenario adapter produces
//! - **Provider Contract**: the capability surface a memory backend must
//!   implement (initialize, ingest, await-indexing, search, clear)
//! - **Isolation**: a fresh container tag per test case so runs never
//!   cross-contaminate memories
//! - **Orchestration**: ingest, index-wait, query, grade per case, with a
//!   bounded worker pool, per-case timeouts and bounded retries
//! - **Classification**: declarative success criteria and failure-mode
//!   attribution (stale retrieval, abstention violations)
//! - **Metrics**: streaming per-category accuracy, latency and failure-mode
//!   statistics
//!
//! ## Architecture
//!
//! ```text
//! datasets / scenarios → unified model → orchestrator → classifier → aggregator
//!                                            ↓
//!                                   memory provider (HTTP)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use membench::{Config, RunOrchestrator};
//! use membench::answer::ExtractiveAnswerer;
//! use membench::provider::HttpMemoryProvider;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let provider = Arc::new(HttpMemoryProvider::new(&config.provider, config.request.clone())?);
//!     let answerer = Arc::new(ExtractiveAnswerer::default());
//!     let orchestrator = Arc::new(RunOrchestrator::new(provider, answerer, config.run.clone()));
//!     let cases = membench::scenario::load_dir("scenarios".as_ref())?;
//!     let summary = orchestrator.run(cases).await?;
//!     println!("{}", serde_json::to_string_pretty(&summary)?);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

/// Answer-generation collaborator contract and the built-in answerer.
pub mod answer;
/// Success/failure classification against criteria and failure modes.
pub mod classifier;
/// Configuration management.
pub mod config;
/// Benchmark dataset adapters.
pub mod dataset;
/// Error types and result aliases.
pub mod error;
/// Container-tag registry for per-case isolation.
pub mod isolation;
/// Streaming run metrics and the summary artifact.
pub mod metrics;
/// Unified data model for sessions, cases and outcomes.
pub mod model;
/// The memory provider contract and HTTP implementation.
pub mod provider;
/// Run orchestration and sampling.
pub mod runner;
/// Scenario file loading.
pub mod scenario;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use metrics::{RunAggregator, RunSummary};
pub use model::{Outcome, TestCase};
pub use provider::MemoryProvider;
pub use runner::{stratified_sample, RunOrchestrator};
