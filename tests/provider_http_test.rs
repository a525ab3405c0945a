//! Integration tests for the HTTP memory provider
//!
//! Exercises the remember/recall/forget/health boundary with wiremock.

use std::sync::Mutex;

use serde_json::json;
use wiremock::{
    matchers::{body_partial_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

use membench::config::{ProviderConfig, RequestConfig};
use membench::error::ProviderError;
use membench::model::{ContainerTag, IngestResult, Message, Session};
use membench::provider::{HttpMemoryProvider, IngestOptions, MemoryProvider, SearchOptions};

/// Create a test provider pointing at the mock server
fn create_test_provider(base_url: &str) -> HttpMemoryProvider {
    let config = ProviderConfig {
        base_url: base_url.to_string(),
        api_key: Some("test-api-key".to_string()),
    };

    let request_config = RequestConfig {
        timeout_ms: 5000,
        max_retries: 0, // No retries for testing
        retry_delay_ms: 100,
    };

    HttpMemoryProvider::new(&config, request_config)
        .expect("Failed to create provider")
        .with_index_budget(500, 50)
}

fn tag(raw: &str) -> ContainerTag {
    ContainerTag::new(raw)
}

fn session(id: &str, contents: &[&str]) -> Session {
    Session::new(id, contents.iter().map(|c| Message::user(*c)).collect())
}

mod initialize_tests {
    use super::*;

    #[tokio::test]
    async fn test_initialize_succeeds_on_healthy_backend() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/health"))
            .and(header("Authorization", "Bearer test-api-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "ok" })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let provider = create_test_provider(&mock_server.uri());
        assert!(provider.initialize().await.is_ok());
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let mock_server = MockServer::start().await;

        // A second call must not issue a duplicate probe.
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "ok" })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let provider = create_test_provider(&mock_server.uri());
        assert!(provider.initialize().await.is_ok());
        assert!(provider.initialize().await.is_ok());
    }

    #[tokio::test]
    async fn test_initialize_fails_on_unhealthy_status() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "degraded" })))
            .mount(&mock_server)
            .await;

        let provider = create_test_provider(&mock_server.uri());
        let err = provider.initialize().await.unwrap_err();
        assert!(matches!(err, ProviderError::Connection { .. }));
    }

    #[tokio::test]
    async fn test_initialize_fails_on_http_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let provider = create_test_provider(&mock_server.uri());
        let err = provider.initialize().await.unwrap_err();
        assert!(err.is_connection());
    }
}

mod ingest_tests {
    use super::*;

    #[tokio::test]
    async fn test_ingest_stores_each_message() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/remember"))
            .and(body_partial_json(json!({ "container_tag": "run-1-case-1-abc" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "memory_id": "mem-1" })))
            .expect(3)
            .mount(&mock_server)
            .await;

        let provider = create_test_provider(&mock_server.uri());
        let sessions = vec![
            session("s-1", &["I play the cello", "I live in Lyon"]),
            session("s-2", &["I adopted a cat"]),
        ];

        let result = provider
            .ingest(&sessions, &IngestOptions::new(tag("run-1-case-1-abc")))
            .await
            .unwrap();

        assert_eq!(result.document_ids.len(), 3);
    }

    #[tokio::test]
    async fn test_ingest_tracks_deduplicated_ids() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/remember"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "duplicate_of": "mem-0" })),
            )
            .mount(&mock_server)
            .await;

        let provider = create_test_provider(&mock_server.uri());
        let sessions = vec![session("s-1", &["repeated fact"])];

        let result = provider
            .ingest(&sessions, &IngestOptions::new(tag("t-1")))
            .await
            .unwrap();

        // A deduplicated id is tracked like a fresh one for cleanup.
        assert_eq!(result.document_ids, vec!["mem-0"]);
    }

    #[tokio::test]
    async fn test_ingest_skips_failed_messages() {
        let mock_server = MockServer::start().await;

        // Backend rejects every store; the batch still succeeds with no ids.
        Mock::given(method("POST"))
            .and(path("/remember"))
            .respond_with(ResponseTemplate::new(422).set_body_string("unprocessable"))
            .expect(2)
            .mount(&mock_server)
            .await;

        let provider = create_test_provider(&mock_server.uri());
        let sessions = vec![session("s-1", &["one", "two"])];

        let result = provider
            .ingest(&sessions, &IngestOptions::new(tag("t-1")))
            .await
            .unwrap();

        assert!(result.document_ids.is_empty());
    }

    #[tokio::test]
    async fn test_ingest_fails_wholesale_when_unreachable() {
        // Nothing listening on this port.
        let provider = create_test_provider("http://127.0.0.1:1");
        let sessions = vec![session("s-1", &["anything"])];

        let err = provider
            .ingest(&sessions, &IngestOptions::new(tag("t-1")))
            .await
            .unwrap_err();

        assert!(err.is_connection());
    }

    #[tokio::test]
    async fn test_ingest_passes_timestamp_through() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/remember"))
            .and(body_partial_json(json!({ "timestamp": "2024-06-20T00:00:00+00:00" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "memory_id": "mem-1" })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let provider = create_test_provider(&mock_server.uri());
        let sessions = vec![session("s-1", &["I've gone vegetarian"])
            .with_timestamp(membench::model::parse_timestamp("2024-06-20").unwrap())];

        let result = provider
            .ingest(&sessions, &IngestOptions::new(tag("t-1")))
            .await
            .unwrap();
        assert_eq!(result.document_ids.len(), 1);
    }
}

mod indexing_tests {
    use super::*;

    #[tokio::test]
    async fn test_await_indexing_returns_immediately_when_synchronous() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/recall"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    { "id": "mem-1", "content": "a", "score": 0.9 },
                    { "id": "mem-2", "content": "b", "score": 0.8 }
                ]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let provider = create_test_provider(&mock_server.uri());
        let result = IngestResult {
            document_ids: vec!["mem-1".to_string(), "mem-2".to_string()],
        };

        let seen = Mutex::new(Vec::new());
        let on_progress = |p: membench::provider::IndexProgress| {
            seen.lock().unwrap().extend(p.completed);
        };

        provider
            .await_indexing(&result, &tag("t-1"), Some(&on_progress))
            .await
            .unwrap();

        let mut seen = seen.into_inner().unwrap();
        seen.sort();
        assert_eq!(seen, vec!["mem-1", "mem-2"]);
    }

    #[tokio::test]
    async fn test_await_indexing_skips_probe_for_empty_result() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/recall"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [] })))
            .expect(0)
            .mount(&mock_server)
            .await;

        let provider = create_test_provider(&mock_server.uri());
        provider
            .await_indexing(&IngestResult::default(), &tag("t-1"), None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_await_indexing_times_out_when_ids_never_appear() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/recall"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [] })))
            .mount(&mock_server)
            .await;

        let provider = create_test_provider(&mock_server.uri());
        let result = IngestResult {
            document_ids: vec!["mem-1".to_string()],
        };

        let err = provider
            .await_indexing(&result, &tag("t-1"), None)
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::IndexingIncomplete { .. }));
    }
}

mod search_tests {
    use super::*;

    #[tokio::test]
    async fn test_search_returns_scored_results() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/recall"))
            .and(body_partial_json(json!({
                "query": "favorite food",
                "container_tag": "t-1",
                "limit": 10
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    { "id": "mem-2", "content": "user: I love ramen", "score": 0.92 },
                    { "id": "mem-5", "content": "user: I tried sushi once", "score": 0.41 }
                ]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let provider = create_test_provider(&mock_server.uri());
        let results = provider
            .search("favorite food", &SearchOptions::new(tag("t-1"), 10))
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "mem-2");
        assert!(results[0].score > results[1].score);
    }

    #[tokio::test]
    async fn test_search_degrades_backend_error_to_empty() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/recall"))
            .respond_with(ResponseTemplate::new(500).set_body_string("index exploded"))
            .mount(&mock_server)
            .await;

        let provider = create_test_provider(&mock_server.uri());
        let results = provider
            .search("anything", &SearchOptions::new(tag("t-1"), 10))
            .await
            .unwrap();

        // Zero results means "no memory found", not failure.
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_search_propagates_unreachable_backend() {
        let provider = create_test_provider("http://127.0.0.1:1");
        let err = provider
            .search("anything", &SearchOptions::new(tag("t-1"), 10))
            .await
            .unwrap_err();
        assert!(err.is_connection());
    }
}

mod clear_tests {
    use super::*;

    #[tokio::test]
    async fn test_clear_counts_deletions_and_tolerates_failures() {
        let mock_server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/forget/mem-1"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock_server)
            .await;
        // Already gone still frees the id.
        Mock::given(method("DELETE"))
            .and(path("/forget/mem-2"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/forget/mem-3"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let provider = create_test_provider(&mock_server.uri());
        let ids = vec![
            "mem-1".to_string(),
            "mem-2".to_string(),
            "mem-3".to_string(),
        ];

        let deleted = provider.clear(&tag("t-1"), &ids).await.unwrap();
        assert_eq!(deleted, 2);
    }
}
