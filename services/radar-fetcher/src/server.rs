//! HTTP status API.
//!
//! Provides endpoints for:
//! - Service health
//! - Current value and cycle diagnostics of every product
//! - Prometheus metrics

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::tracker::{ProductTracker, TrackerSnapshot};

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub products: usize,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductsResponse {
    pub products: Vec<TrackerSnapshot>,
}

// ============================================================================
// Shared State
// ============================================================================

pub struct ServerState {
    pub trackers: Vec<Arc<ProductTracker>>,
    /// `None` when no Prometheus recorder is installed
    pub metrics: Option<PrometheusHandle>,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(trackers: Vec<Arc<ProductTracker>>, metrics: Option<PrometheusHandle>) -> Self {
        Self {
            trackers,
            metrics,
            started_at: Utc::now(),
        }
    }

    fn tracker(&self, code: &str) -> Option<&Arc<ProductTracker>> {
        self.trackers
            .iter()
            .find(|tracker| tracker.code().eq_ignore_ascii_case(code))
    }
}

// ============================================================================
// Router
// ============================================================================

/// Create the status API router.
pub fn create_router(state: Arc<ServerState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/products", get(products_handler))
        .route("/products/:code", get(product_handler))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(Extension(state))
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health
async fn health_handler(Extension(state): Extension<Arc<ServerState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "radar-fetcher".to_string(),
        products: state.trackers.len(),
        started_at: state.started_at,
    })
}

/// GET /products - snapshot of every tracker
async fn products_handler(Extension(state): Extension<Arc<ServerState>>) -> impl IntoResponse {
    let products = join_all(state.trackers.iter().map(|tracker| tracker.snapshot())).await;
    Json(ProductsResponse { products })
}

/// GET /products/:code
async fn product_handler(
    Extension(state): Extension<Arc<ServerState>>,
    Path(code): Path<String>,
) -> Response {
    match state.tracker(&code) {
        Some(tracker) => Json(tracker.snapshot().await).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("Unknown product: {}", code) })),
        )
            .into_response(),
    }
}

/// GET /metrics - Prometheus text format
async fn metrics_handler(Extension(state): Extension<Arc<ServerState>>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics recorder not installed",
        )
            .into_response(),
    }
}

// ============================================================================
// Server
// ============================================================================

/// Run the status server on `port` until the task is dropped.
pub async fn run_server(state: Arc<ServerState>, port: u16) -> anyhow::Result<()> {
    let app = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    info!(port = port, "Starting status server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
