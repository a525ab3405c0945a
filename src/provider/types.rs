use serde::{Deserialize, Serialize};

use crate::model::SearchResult;

/// Request body for `POST /remember`
#[derive(Debug, Clone, Serialize)]
pub struct RememberRequest {
    /// The memory text to store
    pub content: String,
    /// Isolation namespace for the stored memory
    pub container_tag: String,
    /// Opaque context passed through to the backend, never interpreted here
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
    /// Source timestamp, passed through untouched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl RememberRequest {
    /// Create a request storing `content` under `container_tag`
    pub fn new(content: impl Into<String>, container_tag: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            container_tag: container_tag.into(),
            context: None,
            timestamp: None,
        }
    }

    /// Attach opaque context
    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }

    /// Attach the source timestamp, passed through untouched
    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }
}

/// Response body for `POST /remember`.
///
/// Backends may deduplicate: `duplicate_of` names the pre-existing record
/// instead of a freshly minted `memory_id`. Either way the id is tracked for
/// later cleanup.
#[derive(Debug, Clone, Deserialize)]
pub struct RememberResponse {
    /// Freshly minted id for the stored memory
    #[serde(default)]
    pub memory_id: Option<String>,
    /// Id of the equivalent pre-existing record, when deduplicated
    #[serde(default)]
    pub duplicate_of: Option<String>,
}

impl RememberResponse {
    /// The id under which the content is stored, deduped or fresh
    pub fn stored_id(&self) -> Option<&str> {
        self.memory_id
            .as_deref()
            .or(self.duplicate_of.as_deref())
    }
}

/// Request body for `POST /recall`
#[derive(Debug, Clone, Serialize)]
pub struct RecallRequest {
    /// Search query text
    pub query: String,
    /// Isolation namespace to search within
    pub container_tag: String,
    /// Maximum results to return
    pub limit: usize,
    /// Minimum relevance score, if the backend supports one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
}

/// Response body for `POST /recall`
#[derive(Debug, Clone, Deserialize)]
pub struct RecallResponse {
    /// Hits in relevance order
    #[serde(default)]
    pub results: Vec<RecallHit>,
}

/// One scored hit in a recall response
#[derive(Debug, Clone, Deserialize)]
pub struct RecallHit {
    /// Provider-assigned memory id
    pub id: String,
    /// The stored memory text
    pub content: String,
    /// Provider relevance score
    #[serde(default)]
    pub score: f64,
    /// Opaque provider metadata
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl From<RecallHit> for SearchResult {
    fn from(hit: RecallHit) -> Self {
        SearchResult {
            id: hit.id,
            content: hit.content,
            score: hit.score,
            metadata: hit.metadata,
        }
    }
}

/// Response body for `GET /health`
#[derive(Debug, Clone, Deserialize)]
pub struct HealthResponse {
    /// Backend-reported status string
    pub status: String,
}

impl HealthResponse {
    /// Whether the backend reports itself usable
    pub fn is_healthy(&self) -> bool {
        matches!(self.status.as_str(), "ok" | "healthy")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remember_response_prefers_fresh_id() {
        let resp = RememberResponse {
            memory_id: Some("mem-1".to_string()),
            duplicate_of: None,
        };
        assert_eq!(resp.stored_id(), Some("mem-1"));
    }

    #[test]
    fn test_remember_response_falls_back_to_duplicate() {
        let resp = RememberResponse {
            memory_id: None,
            duplicate_of: Some("mem-0".to_string()),
        };
        assert_eq!(resp.stored_id(), Some("mem-0"));
    }

    #[test]
    fn test_health_status_values() {
        assert!(HealthResponse {
            status: "ok".to_string()
        }
        .is_healthy());
        assert!(HealthResponse {
            status: "healthy".to_string()
        }
        .is_healthy());
        assert!(!HealthResponse {
            status: "degraded".to_string()
        }
        .is_healthy());
    }

    #[test]
    fn test_remember_request_skips_empty_fields() {
        let req = RememberRequest::new("user: hi", "tag-1");
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("context").is_none());
        assert!(json.get("timestamp").is_none());
    }
}
