//! Integration tests for the backend client against a mock
//! Prometheus-compatible server.

use httpmock::prelude::*;
use promsage::backend::{MetricsClient, QueryResult};
use promsage::config::BackendConfig;
use promsage::error::BackendError;
use serde_json::json;

fn test_backend_config(url: &str, kind: &str) -> BackendConfig {
    BackendConfig {
        url: url.to_string(),
        kind: kind.to_string(),
        auth_mode: "none".to_string(),
        username: String::new(),
        password: String::new(),
        bearer_token: String::new(),
        tenant_id: None,
        timeout_seconds: 5,
    }
}

fn success_vector_body() -> serde_json::Value {
    json!({
        "status": "success",
        "data": {
            "resultType": "vector",
            "result": [
                {"metric": {"__name__": "up", "job": "api"}, "value": [1700000000.0, "1"]}
            ]
        }
    })
}

#[tokio::test]
async fn test_auto_detection_settles_on_prometheus_prefix() {
    let server = MockServer::start_async().await;

    let prometheus = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v1/query");
            then.status(200).json_body(success_vector_body());
        })
        .await;
    let mimir = server
        .mock_async(|when, then| {
            when.method(GET).path("/prometheus/api/v1/query");
            then.status(404);
        })
        .await;

    let client = MetricsClient::new(&test_backend_config(&server.base_url(), "auto"));

    // Repeated calls all land on the Prometheus-style prefix; the probe
    // decision holds for the client's lifetime.
    for _ in 0..3 {
        let result = client.query("up", None).await.unwrap();
        assert!(matches!(result, QueryResult::Vector(_)));
    }

    // One probe hit plus three queries.
    assert_eq!(prometheus.hits_async().await, 4);
    assert_eq!(mimir.hits_async().await, 0);
}

#[tokio::test]
async fn test_auto_detection_falls_back_to_mimir_prefix() {
    let server = MockServer::start_async().await;

    let prometheus = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v1/query");
            then.status(404);
        })
        .await;
    let mimir = server
        .mock_async(|when, then| {
            when.method(GET).path("/prometheus/api/v1/query");
            then.status(200).json_body(success_vector_body());
        })
        .await;

    let client = MetricsClient::new(&test_backend_config(&server.base_url(), "auto"));
    client.query("up", None).await.unwrap();
    client.query("up", None).await.unwrap();

    // The Prometheus prefix was probed once, rejected, and never used again.
    assert_eq!(prometheus.hits_async().await, 1);
    assert_eq!(mimir.hits_async().await, 3);
}

#[tokio::test]
async fn test_configured_kind_skips_probe() {
    let server = MockServer::start_async().await;

    let mimir = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/prometheus/api/v1/query")
                .query_param("query", "up");
            then.status(200).json_body(success_vector_body());
        })
        .await;

    let client = MetricsClient::new(&test_backend_config(&server.base_url(), "mimir"));
    client.query("up", None).await.unwrap();

    assert_eq!(mimir.hits_async().await, 1);
}

#[tokio::test]
async fn test_range_query_parses_matrix() {
    let server = MockServer::start_async().await;

    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/v1/query_range")
                .query_param("query", "rate(http_requests_total[5m])")
                .query_param("step", "60");
            then.status(200).json_body(json!({
                "status": "success",
                "data": {
                    "resultType": "matrix",
                    "result": [
                        {
                            "metric": {"job": "api"},
                            "values": [[1700000000.0, "1.0"], [1700000060.0, "2.0"]]
                        }
                    ]
                }
            }));
        })
        .await;

    let client = MetricsClient::new(&test_backend_config(&server.base_url(), "prometheus"));
    let result = client
        .query_range("rate(http_requests_total[5m])", 1700000000.0, 1700003600.0, 60)
        .await
        .unwrap();

    match result {
        QueryResult::Matrix(series) => {
            assert_eq!(series.len(), 1);
            assert_eq!(series[0].points.len(), 2);
        }
        other => panic!("expected matrix, got {}", other.kind()),
    }
}

#[tokio::test]
async fn test_non_2xx_surfaces_status_and_body() {
    let server = MockServer::start_async().await;

    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v1/query");
            then.status(503).body("backend melting down");
        })
        .await;

    let client = MetricsClient::new(&test_backend_config(&server.base_url(), "prometheus"));
    let err = client.query("up", None).await.unwrap_err();

    match err {
        BackendError::HttpStatus { status, body } => {
            assert_eq!(status.as_u16(), 503);
            assert_eq!(body, "backend melting down");
        }
        other => panic!("expected HttpStatus, got {:?}", other),
    }
}

#[tokio::test]
async fn test_envelope_error_is_malformed_response() {
    let server = MockServer::start_async().await;

    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v1/query");
            then.status(200).json_body(json!({
                "status": "error",
                "errorType": "bad_data",
                "error": "parse error"
            }));
        })
        .await;

    let client = MetricsClient::new(&test_backend_config(&server.base_url(), "prometheus"));
    let err = client.query("up{", None).await.unwrap_err();
    assert!(matches!(err, BackendError::MalformedResponse(_)));
}

#[tokio::test]
async fn test_metric_names_and_scoped_label_values() {
    let server = MockServer::start_async().await;

    let names = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v1/label/__name__/values");
            then.status(200).json_body(json!({
                "status": "success",
                "data": ["http_requests_total", "go_goroutines"]
            }));
        })
        .await;
    let scoped = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/v1/label/service/values")
                .query_param("match[]", "http_requests_total");
            then.status(200).json_body(json!({
                "status": "success",
                "data": ["api"]
            }));
        })
        .await;

    let client = MetricsClient::new(&test_backend_config(&server.base_url(), "prometheus"));

    let metric_names = client.metric_names().await.unwrap();
    assert_eq!(metric_names, vec!["http_requests_total", "go_goroutines"]);

    let values = client
        .label_values("service", &["http_requests_total".to_string()])
        .await
        .unwrap();
    assert_eq!(values, vec!["api"]);

    names.assert_async().await;
    scoped.assert_async().await;
}

#[tokio::test]
async fn test_metadata_prefers_backend_registration() {
    let server = MockServer::start_async().await;

    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/v1/metadata")
                .query_param("metric", "current_connections");
            then.status(200).json_body(json!({
                "status": "success",
                "data": {
                    "current_connections": [
                        {"type": "gauge", "help": "Open connections", "unit": ""}
                    ]
                }
            }));
        })
        .await;

    let client = MetricsClient::new(&test_backend_config(&server.base_url(), "prometheus"));
    let meta = client.metric_metadata("current_connections").await.unwrap();

    assert_eq!(meta.metric_type, "gauge");
    assert_eq!(meta.help, "Open connections");
    assert!(!meta.inferred);
}

#[tokio::test]
async fn test_metadata_falls_back_to_name_inference() {
    let server = MockServer::start_async().await;

    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v1/metadata");
            then.status(200).json_body(json!({
                "status": "success",
                "data": {}
            }));
        })
        .await;

    let client = MetricsClient::new(&test_backend_config(&server.base_url(), "prometheus"));
    let meta = client.metric_metadata("http_requests_total").await.unwrap();

    assert_eq!(meta.metric_type, "counter");
    assert!(meta.inferred);
}

#[tokio::test]
async fn test_tenant_header_and_bearer_auth_are_sent() {
    let server = MockServer::start_async().await;

    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/v1/query")
                .header("X-Scope-OrgID", "team-observability")
                .header("authorization", "Bearer s3cr3t-token");
            then.status(200).json_body(success_vector_body());
        })
        .await;

    let mut config = test_backend_config(&server.base_url(), "prometheus");
    config.auth_mode = "bearer".to_string();
    config.bearer_token = "s3cr3t-token".to_string();
    config.tenant_id = Some("team-observability".to_string());

    let client = MetricsClient::new(&config);
    client.query("up", None).await.unwrap();

    mock.assert_async().await;
}
