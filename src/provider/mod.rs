//! The capability surface every memory backend must implement.
//!
//! The orchestrator depends only on [`MemoryProvider`], never on a concrete
//! backend; new providers are added by satisfying the contract alone.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::ProviderResult;
use crate::model::{ContainerTag, IngestResult, SearchResult, Session};

mod http;
/// Wire types for the provider HTTP API.
pub mod types;

pub use http::HttpMemoryProvider;

/// Options for an ingest call
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Isolation namespace the memories are stored under
    pub container_tag: ContainerTag,
    /// Opaque metadata passed through to the backend
    pub metadata: HashMap<String, serde_json::Value>,
}

impl IngestOptions {
    /// Options scoped to the given tag, no extra metadata
    pub fn new(container_tag: ContainerTag) -> Self {
        Self {
            container_tag,
            metadata: HashMap::new(),
        }
    }
}

/// Options for a search call
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Isolation namespace to search within
    pub container_tag: ContainerTag,
    /// Maximum results to return
    pub limit: usize,
    /// Minimum relevance score, if the backend supports one
    pub threshold: Option<f64>,
}

impl SearchOptions {
    /// Search scoped to the given tag with a result limit
    pub fn new(container_tag: ContainerTag, limit: usize) -> Self {
        Self {
            container_tag,
            limit,
            threshold: None,
        }
    }
}

/// Incremental index-wait progress: ids learned searchable or failed so far
#[derive(Debug, Clone, Default)]
pub struct IndexProgress {
    /// Ids newly observed searchable
    pub completed: Vec<String>,
    /// Ids the backend reported failed to index
    pub failed: Vec<String>,
}

/// Callback receiving [`IndexProgress`] updates during index-wait
pub type ProgressFn<'a> = &'a (dyn Fn(IndexProgress) + Send + Sync);

/// Polymorphic capability set of a memory backend.
///
/// Contract notes:
/// - `initialize` is idempotent; calling it twice is safe.
/// - Concurrent `ingest` calls with the same container tag must be
///   serialized by the caller; the contract guarantees no backend-side
///   atomicity across messages.
/// - `search` returns results scoped strictly to the given tag and degrades
///   backend errors to an empty list; only transport unreachability is an
///   error.
#[async_trait]
pub trait MemoryProvider: Send + Sync {
    /// Backend identity for logs and reports
    fn name(&self) -> &str;

    /// Establish connectivity via a reachability probe.
    ///
    /// Fails with a connection error if the backend is unreachable or
    /// reports a non-success health status.
    async fn initialize(&self) -> ProviderResult<()>;

    /// Store every message of every session under the options' container
    /// tag, preserving message order within each session.
    ///
    /// Per-message store failures are logged and skipped; the call fails
    /// wholesale only when the backend is unreachable.
    async fn ingest(
        &self,
        sessions: &[Session],
        options: &IngestOptions,
    ) -> ProviderResult<IngestResult>;

    /// Block until every id in `result` is searchable, emitting progress as
    /// ids are learned complete. Returns immediately for backends that index
    /// synchronously.
    async fn await_indexing(
        &self,
        result: &IngestResult,
        container_tag: &ContainerTag,
        on_progress: Option<ProgressFn<'_>>,
    ) -> ProviderResult<()>;

    /// Search memories under the options' container tag, relevance
    /// descending.
    async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> ProviderResult<Vec<SearchResult>>;

    /// Delete the given tracked ids, best-effort; returns how many were
    /// removed. Individual deletion failures are counted, never fatal.
    async fn clear(&self, container_tag: &ContainerTag, ids: &[String]) -> ProviderResult<usize>;
}
