use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, Method};
use tracing::{debug, info, warn};

use super::types::{HealthResponse, RecallRequest, RecallResponse, RememberRequest, RememberResponse};
use super::{IndexProgress, IngestOptions, MemoryProvider, ProgressFn, SearchOptions};
use crate::config::{ProviderConfig, RequestConfig};
use crate::error::{ProviderError, ProviderResult};
use crate::model::{ContainerTag, IngestResult, SearchResult, Session};

/// Query used to probe whether ingested ids have become searchable
const INDEX_PROBE_QUERY: &str = "*";

/// Memory provider speaking the remember/recall/forget/health HTTP boundary
pub struct HttpMemoryProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    request_config: RequestConfig,
    index_budget_ms: u64,
    index_poll_ms: u64,
    initialized: AtomicBool,
}

impl HttpMemoryProvider {
    /// Create a new HTTP provider
    pub fn new(config: &ProviderConfig, request_config: RequestConfig) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(ProviderError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            request_config,
            index_budget_ms: 60_000,
            index_poll_ms: 500,
            initialized: AtomicBool::new(false),
        })
    }

    /// Override the index-wait budget and poll interval
    pub fn with_index_budget(mut self, budget_ms: u64, poll_ms: u64) -> Self {
        self.index_budget_ms = budget_ms;
        self.index_poll_ms = poll_ms.max(1);
        self
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Execute a single request (internal)
    async fn execute_once(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> ProviderResult<serde_json::Value> {
        let url = format!("{}{}", self.base_url, path);

        let mut request = self.client.request(method, &url);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }
        if let Some(body) = body {
            request = request.header("Content-Type", "application/json").json(body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout {
                    timeout_ms: self.request_config.timeout_ms,
                }
            } else {
                ProviderError::Http(e)
            }
        })?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        let text = response.text().await.map_err(ProviderError::Http)?;
        if text.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| ProviderError::InvalidResponse {
            message: format!("Failed to parse response: {}", e),
        })
    }

    /// Execute a request with exponential-backoff retry.
    ///
    /// Transport faults and 5xx responses are retried; 4xx responses are
    /// returned immediately since retrying cannot change them.
    async fn send_with_retry(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> ProviderResult<serde_json::Value> {
        let mut last_error = None;
        let mut retries = 0;

        while retries <= self.request_config.max_retries {
            if retries > 0 {
                let delay = Duration::from_millis(
                    self.request_config.retry_delay_ms * (2_u64.pow(retries - 1)),
                );
                warn!(
                    path = %path,
                    retry = retries,
                    delay_ms = delay.as_millis(),
                    "Retrying provider request"
                );
                tokio::time::sleep(delay).await;
            }

            match self.execute_once(method.clone(), path, body.as_ref()).await {
                Ok(value) => return Ok(value),
                Err(ProviderError::Api { status, message }) if status < 500 => {
                    return Err(ProviderError::Api { status, message });
                }
                Err(e) => {
                    debug!(path = %path, error = %e, retry = retries, "Provider request failed");
                    last_error = Some(e);
                    retries += 1;
                }
            }
        }

        match last_error {
            Some(e) if e.is_connection() => Err(ProviderError::Connection {
                message: e.to_string(),
                retries: retries.saturating_sub(1),
            }),
            Some(e) => Err(e),
            None => Err(ProviderError::Connection {
                message: "Unknown error".to_string(),
                retries: 0,
            }),
        }
    }

    /// Ids under the tag currently visible through recall
    async fn searchable_ids(
        &self,
        container_tag: &ContainerTag,
        limit: usize,
    ) -> ProviderResult<HashSet<String>> {
        let request = RecallRequest {
            query: INDEX_PROBE_QUERY.to_string(),
            container_tag: container_tag.as_str().to_string(),
            limit,
            threshold: None,
        };
        let body = serde_json::to_value(&request).map_err(|e| ProviderError::InvalidResponse {
            message: e.to_string(),
        })?;
        let value = self.send_with_retry(Method::POST, "/recall", Some(body)).await?;
        let response: RecallResponse =
            serde_json::from_value(value).map_err(|e| ProviderError::InvalidResponse {
                message: format!("Failed to parse recall response: {}", e),
            })?;
        Ok(response.results.into_iter().map(|hit| hit.id).collect())
    }
}

#[async_trait]
impl MemoryProvider for HttpMemoryProvider {
    fn name(&self) -> &str {
        "http"
    }

    async fn initialize(&self) -> ProviderResult<()> {
        // Idempotent: a second call must not issue a duplicate probe.
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }

        // Any probe fault means the backend is not usable, whatever the
        // transport-level shape of the failure was.
        let value = self
            .send_with_retry(Method::GET, "/health", None)
            .await
            .map_err(|e| match e {
                ProviderError::Connection { .. } => e,
                other => ProviderError::Connection {
                    message: other.to_string(),
                    retries: self.request_config.max_retries,
                },
            })?;
        let health: HealthResponse =
            serde_json::from_value(value).map_err(|e| ProviderError::InvalidResponse {
                message: format!("Failed to parse health response: {}", e),
            })?;

        if !health.is_healthy() {
            return Err(ProviderError::Connection {
                message: format!("Provider reports status '{}'", health.status),
                retries: 0,
            });
        }

        info!(base_url = %self.base_url, "Provider healthy");
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    async fn ingest(
        &self,
        sessions: &[Session],
        options: &IngestOptions,
    ) -> ProviderResult<IngestResult> {
        let mut document_ids = Vec::new();
        let mut attempted = 0usize;
        let mut skipped = 0usize;

        for session in sessions {
            for message in &session.messages {
                attempted += 1;

                let mut context = serde_json::json!({ "session": session.session_id });
                for (key, value) in &options.metadata {
                    context[key] = value.clone();
                }

                let mut request = RememberRequest::new(
                    message.render(),
                    options.container_tag.as_str(),
                )
                .with_context(context);

                // Timestamps pass through untouched so the backend can do
                // temporal reasoning regardless of ingestion order.
                if let Some(ts) = message.timestamp.or(session.timestamp) {
                    request = request.with_timestamp(ts.to_rfc3339());
                }

                let body =
                    serde_json::to_value(&request).map_err(|e| ProviderError::InvalidResponse {
                        message: e.to_string(),
                    })?;

                match self.send_with_retry(Method::POST, "/remember", Some(body)).await {
                    Ok(value) => {
                        let response: RememberResponse = serde_json::from_value(value)
                            .unwrap_or(RememberResponse {
                                memory_id: None,
                                duplicate_of: None,
                            });
                        match response.stored_id() {
                            Some(id) => document_ids.push(id.to_string()),
                            None => {
                                skipped += 1;
                                warn!(
                                    session = %session.session_id,
                                    tag = %options.container_tag,
                                    "Store response carried no id, skipping message"
                                );
                            }
                        }
                    }
                    Err(e) if e.is_connection() => return Err(e),
                    Err(e) => {
                        // Partial ingest: a failed message never aborts the batch.
                        skipped += 1;
                        warn!(
                            session = %session.session_id,
                            tag = %options.container_tag,
                            error = %e,
                            "Message store failed, skipping"
                        );
                    }
                }
            }
        }

        info!(
            tag = %options.container_tag,
            stored = document_ids.len(),
            attempted,
            skipped,
            "Ingest complete"
        );

        Ok(IngestResult { document_ids })
    }

    async fn await_indexing(
        &self,
        result: &IngestResult,
        container_tag: &ContainerTag,
        on_progress: Option<ProgressFn<'_>>,
    ) -> ProviderResult<()> {
        if result.document_ids.is_empty() {
            return Ok(());
        }

        let mut pending: HashSet<String> = result.document_ids.iter().cloned().collect();
        let limit = pending.len().max(1);
        let budget = Duration::from_millis(self.index_budget_ms);
        let started = Instant::now();

        loop {
            let visible = self.searchable_ids(container_tag, limit).await?;
            let newly_completed: Vec<String> =
                pending.iter().filter(|id| visible.contains(*id)).cloned().collect();

            if !newly_completed.is_empty() {
                for id in &newly_completed {
                    pending.remove(id);
                }
                if let Some(progress) = on_progress {
                    progress(IndexProgress {
                        completed: newly_completed,
                        failed: Vec::new(),
                    });
                }
            }

            if pending.is_empty() {
                debug!(tag = %container_tag, "All documents searchable");
                return Ok(());
            }

            if started.elapsed() >= budget {
                return Err(ProviderError::IndexingIncomplete {
                    budget_ms: self.index_budget_ms,
                    pending: pending.len(),
                });
            }

            tokio::time::sleep(Duration::from_millis(self.index_poll_ms)).await;
        }
    }

    async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> ProviderResult<Vec<SearchResult>> {
        let request = RecallRequest {
            query: query.to_string(),
            container_tag: options.container_tag.as_str().to_string(),
            limit: options.limit,
            threshold: options.threshold,
        };
        let body = serde_json::to_value(&request).map_err(|e| ProviderError::InvalidResponse {
            message: e.to_string(),
        })?;

        match self.send_with_retry(Method::POST, "/recall", Some(body)).await {
            Ok(value) => {
                let response: RecallResponse =
                    serde_json::from_value(value).map_err(|e| ProviderError::InvalidResponse {
                        message: format!("Failed to parse recall response: {}", e),
                    })?;
                Ok(response.results.into_iter().map(SearchResult::from).collect())
            }
            Err(e) if e.is_connection() => Err(e),
            Err(e) => {
                // Zero results means "no memory found", not failure.
                warn!(tag = %options.container_tag, error = %e, "Search degraded to empty result");
                Ok(Vec::new())
            }
        }
    }

    async fn clear(&self, container_tag: &ContainerTag, ids: &[String]) -> ProviderResult<usize> {
        let mut deleted = 0usize;

        for id in ids {
            let path = format!("/forget/{}", id);
            match self.execute_once(Method::DELETE, &path, None).await {
                Ok(_) => deleted += 1,
                // Already gone still frees the id.
                Err(ProviderError::Api { status: 404, .. }) => deleted += 1,
                Err(e) => {
                    warn!(tag = %container_tag, id = %id, error = %e, "Delete failed");
                }
            }
        }

        info!(tag = %container_tag, deleted, total = ids.len(), "Container cleared");
        Ok(deleted)
    }
}
