//! HTTP API gateway for clinq.
//!
//! Exposes the question endpoint, a history read, and a health check.
//!
//! Built on Axum for high performance async HTTP.

pub mod api_v1;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderName, HeaderValue, Method, header};
use axum::{Router, extract::State, response::Json, routing::get};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::info;

use clinq_agent::{AnswerPipeline, Stores};
use clinq_config::AppConfig;
use clinq_core::store::HistoryStore;
use clinq_retrieval::{BreakerState, CircuitBreaker};
use clinq_store::SqliteStore;

/// Header carrying the conversation id on streamed answers.
pub const CONVERSATION_ID_HEADER: &str = "x-conversation-id";

/// Shared application state for the gateway.
pub struct GatewayState {
    pub pipeline: Arc<AnswerPipeline>,
    pub history: Arc<dyn HistoryStore>,
    pub web_breaker: Arc<CircuitBreaker>,
}

pub type SharedState = Arc<GatewayState>;

/// Build the full router.
///
/// Layers applied:
/// - CORS restricted to the local UI origin
/// - Request body size limit (1 MB)
/// - HTTP trace logging
pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::exact(HeaderValue::from_static(
            "http://localhost:8080",
        )))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .expose_headers([HeaderName::from_static(CONVERSATION_ID_HEADER)])
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_handler))
        .with_state(state.clone())
        .nest("/v1", api_v1::v1_router(state))
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Build the gateway state from configuration.
///
/// Opens the SQLite store and wires providers, sources and the pipeline.
/// Both the server and the one-shot CLI go through here.
pub async fn build_state(config: &AppConfig) -> Result<SharedState, Box<dyn std::error::Error>> {
    let store = Arc::new(SqliteStore::new(&config.storage.database).await?);
    let stores = Stores {
        history: store.clone(),
        profiles: store.clone(),
        analytics: store.clone(),
    };

    let web_breaker = Arc::new(CircuitBreaker::new());
    let providers = clinq_providers::build_from_config(config);
    let pipeline = AnswerPipeline::from_config(config, providers, web_breaker.clone(), stores);

    Ok(Arc::new(GatewayState {
        pipeline: Arc::new(pipeline),
        history: store,
        web_breaker,
    }))
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let state = build_state(&config).await?;
    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Handlers ---

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// `open` once the trusted web source has been cut off for this process.
    pub web_search: BreakerState,
}

async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        web_search: state.web_breaker.state(),
    })
}


#[cfg(test)]
mod tests {
    use super::test_support::{MockProvider, test_state};
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_endpoint_reports_breaker() {
        let (state, _) = test_state(MockProvider {
            chunks: vec![],
            error: None,
        });
        let breaker = state.web_breaker.clone();
        let app = build_router(state);

        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app.clone().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let health: HealthResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(health.status, "ok");
        assert_eq!(health.web_search, BreakerState::Closed);

        breaker.trip();
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app.oneshot(req).await.unwrap();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let health: HealthResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(health.web_search, BreakerState::Open);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let (state, _) = test_state(MockProvider {
            chunks: vec!["x"],
            error: None,
        });
        let app = build_router(state);

        let big = format!(
            r#"{{"messages":[{{"role":"user","content":"{}"}}]}}"#,
            "a".repeat(2 * 1024 * 1024)
        );
        let req = Request::builder()
            .method("POST")
            .uri("/v1/ask")
            .header("content-type", "application/json")
            .body(Body::from(big))
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    }
}
