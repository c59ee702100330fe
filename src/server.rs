use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::{net::SocketAddr, sync::Arc};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::{
    backend::Backend,
    catalog::{InMemoryCatalog, ServiceCatalog},
    config::Config,
    discovery::DiscoveryEngine,
    handlers,
    metrics,
    safety::SafetyPolicy,
};

/// Start the promsage server
///
/// This function:
/// 1. Initializes metrics
/// 2. Builds the breaker-wrapped backend, catalog, and safety policy
/// 3. Starts the discovery engine when enabled
/// 4. Serves the API with graceful shutdown support
pub async fn start_server(config: Config) -> Result<()> {
    info!("Initializing Prometheus metrics...");
    let metrics_handle = Arc::new(metrics::init_metrics());

    let backend = Arc::new(Backend::new(&config.backend, &config.circuit_breaker));
    let catalog: Arc<dyn ServiceCatalog> = Arc::new(InMemoryCatalog::new());
    let policy = Arc::new(SafetyPolicy::from_config(&config.safety));

    let discovery = Arc::new(DiscoveryEngine::new(
        backend.clone(),
        catalog.clone(),
        &config.discovery,
    ));

    if config.discovery.enabled {
        // A dead backend at boot should not take the query API down with it;
        // discovery can be restarted once the backend is reachable.
        if let Err(e) = discovery.clone().start().await {
            warn!(error = %e, "discovery engine did not start");
        }
    } else {
        info!("discovery is disabled by configuration");
    }

    let app_state = handlers::AppState {
        backend,
        catalog,
        policy,
        processor: config.processor.clone(),
    };

    let app = create_router(app_state, metrics_handle);

    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));

    info!("Starting promsage on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    discovery.stop();
    info!("Server stopped gracefully");

    Ok(())
}

/// Create the Axum router with all routes and middleware
pub fn create_router(
    app_state: handlers::AppState,
    metrics_handle: Arc<metrics_exporter_prometheus::PrometheusHandle>,
) -> Router {
    let api_routes = Router::new()
        .route("/api/v1/query", post(handlers::query::handle_query))
        .route("/api/v1/services", get(handlers::services::list_services))
        .route("/ready", get(handlers::health::readiness_check))
        .with_state(app_state);

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::metrics_handler::metrics))
        .with_state(metrics_handle)
        .merge(api_routes)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c, draining connections..."),
        _ = terminate => info!("received SIGTERM, draining connections..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn create_test_state() -> handlers::AppState {
        let config = crate::config::BackendConfig {
            url: "http://localhost:9090".to_string(),
            kind: "prometheus".to_string(),
            auth_mode: "none".to_string(),
            username: String::new(),
            password: String::new(),
            bearer_token: String::new(),
            tenant_id: None,
            timeout_seconds: 5,
        };

        handlers::AppState {
            backend: Arc::new(Backend::new(
                &config,
                &crate::config::BreakerConfig::default(),
            )),
            catalog: Arc::new(InMemoryCatalog::new()),
            policy: Arc::new(SafetyPolicy::default()),
            processor: crate::config::ProcessorConfig::default(),
        }
    }

    #[tokio::test]
    async fn test_health_route() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let app = create_router(create_test_state(), Arc::new(recorder.handle()));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_rejected_query_is_bad_request() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let app = create_router(create_test_state(), Arc::new(recorder.handle()));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/query")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        serde_json::json!({"query": "rate(app_secret_key[5m])"}).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
