//! Homewatch HTTP API
//!
//! HTTP surface of the bridge, built with Axum.
//!
//! # Endpoints
//!
//! ## Control
//! - `POST /api/v1/control/door` - Lock or unlock the door
//! - `POST /api/v1/control/lamp` - Switch the lamp
//! - `POST /api/v1/control/curtain` - Move the curtain
//! - `POST /api/v1/control/buzzer` - Sound or silence the buzzer
//!
//! ## Health
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe
//! - `GET /health` - Full health status
//!
//! ## WebSocket
//! - `GET /ws` - Real-time event stream

pub mod dto;
pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::ApiConfig;
use crate::websocket::websocket_handler;

/// Build the API router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let control_routes = Router::new()
        .route("/door", post(routes::control::control_door))
        .route("/lamp", post(routes::control::control_lamp))
        .route("/curtain", post(routes::control::control_curtain))
        .route("/buzzer", post(routes::control::control_buzzer));

    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/ready", get(routes::health::readiness))
        .route("/", get(routes::health::full_health));

    let cors = cors_layer(&state.config);
    let shared_state = Arc::new(state);

    Router::new()
        .nest("/api/v1/control", control_routes)
        .nest("/health", health_routes)
        .route("/ws", get(websocket_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(shared_state)
}

fn cors_layer(config: &ApiConfig) -> CorsLayer {
    if config.cors_origins.is_empty() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Start the API server and run until `shutdown` resolves
pub async fn serve<F>(state: AppState, shutdown: F) -> Result<(), ApiError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = state.config.addr();
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Homewatch API listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

    tracing::info!("Homewatch API shut down gracefully");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::transport::memory::MemoryTransport;
    use crate::bridge::{CommandPublisher, ControlTopics};
    use crate::persistence::{DiscardStore, PersistenceWorker, WorkerConfig};
    use crate::websocket::{BroadcastHub, HubConfig, HubHandle};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use std::time::Duration;
    use tower::util::ServiceExt;

    struct TestApp {
        router: Router,
        transport: Arc<MemoryTransport>,
        hub: HubHandle,
    }

    fn create_test_app() -> TestApp {
        let transport = Arc::new(MemoryTransport::new());
        let publisher = CommandPublisher::new(
            transport.clone(),
            ControlTopics::from_prefix("iotcihuy/home"),
        );
        let (hub, _) = BroadcastHub::spawn(HubConfig::default());
        let (persistence, _) =
            PersistenceWorker::spawn(Arc::new(DiscardStore), WorkerConfig::default());

        let state = AppState::new(
            hub.clone(),
            publisher,
            persistence,
            ApiConfig::default(),
            Duration::from_secs(60),
        );

        TestApp {
            router: build_router(state),
            transport,
            hub,
        }
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_live() {
        let app = create_test_app();

        let response = app.router.oneshot(get("/health/live")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_ready() {
        let app = create_test_app();

        let response = app.router.oneshot(get("/health/ready")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_ready_after_hub_shutdown() {
        let app = create_test_app();
        app.hub.shutdown().await;
        // Wait for the loop to drop its receiver
        while app.hub.viewer_count().await.is_ok() {
            tokio::task::yield_now().await;
        }

        let response = app.router.oneshot(get("/health/ready")).await.unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_health_full() {
        let app = create_test_app();
        let _viewer = app.hub.register().await.unwrap();

        let response = app.router.oneshot(get("/health")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["viewers"], 1);
        assert_eq!(json["persistence"]["dropped"], 0);
    }

    #[tokio::test]
    async fn test_door_control() {
        let app = create_test_app();

        let response = app
            .router
            .oneshot(post_json("/api/v1/control/door", r#"{"action": "unlock"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let sent = app.transport.published_to("iotcihuy/home/door/control");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].payload_str(), r#"{"action":"unlock","method":"remote"}"#);
    }

    #[tokio::test]
    async fn test_door_control_invalid_action() {
        let app = create_test_app();

        let response = app
            .router
            .oneshot(post_json("/api/v1/control/door", r#"{"action": "open"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
        assert!(app.transport.published().is_empty());
    }

    #[tokio::test]
    async fn test_door_control_publish_failure() {
        let app = create_test_app();
        app.transport.set_fail_publish(true);

        let response = app
            .router
            .oneshot(post_json("/api/v1/control/door", r#"{"action": "lock"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_control_invalid_json() {
        let app = create_test_app();

        let response = app
            .router
            .oneshot(post_json("/api/v1/control/lamp", "not json"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_curtain_open() {
        let app = create_test_app();

        let response = app
            .router
            .oneshot(post_json("/api/v1/control/curtain", r#"{"action": "open"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let sent = app.transport.published_to("iotcihuy/home/curtain/control");
        assert_eq!(
            sent[0].payload_str(),
            r#"{"action":"open","mode":"manual","position":100}"#
        );
    }

    #[tokio::test]
    async fn test_manual_buzzer() {
        let app = create_test_app();

        let response = app
            .router
            .oneshot(post_json("/api/v1/control/buzzer", r#"{"action": "on"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let sent = app.transport.published_to("iotcihuy/home/buzzer/control");
        assert_eq!(sent[0].payload_str(), r#"{"action":"on","source":"manual_api"}"#);
    }
}
