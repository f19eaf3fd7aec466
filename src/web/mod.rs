// HTTP service: the remote-call mode of the pipeline.
//
// One synchronous endpoint runs the full pipeline per request and answers
// only when it has finished. A semaphore sized to the worker count bounds how
// many invocations run at once; extra requests wait for a permit. Each
// invocation has its own accumulator; only the read-only model handles and
// the resource scope are shared.
//
// Request bodies are capped by `max_body_bytes` (OPINION_MAX_REQUEST_BYTES),
// well above axum's 2 MB default so large corpora fit in one call.
//
// No timeouts here: an invocation runs to completion or failure, so callers
// set their own deadline.

use std::sync::Arc;

use anyhow::Result;
use axum::extract::DefaultBodyLimit;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tokio::sync::Semaphore;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::DEFAULT_MAX_REQUEST_BYTES;
use crate::pipeline::PipelineOrchestrator;

pub mod handlers;

/// Shared application state threaded through all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<PipelineOrchestrator>,
    pub workers: Arc<Semaphore>,
    /// Total permits in `workers`, for status reporting.
    pub capacity: usize,
    pub max_body_bytes: usize,
}

impl AppState {
    pub fn new(orchestrator: Arc<PipelineOrchestrator>, workers: usize) -> Self {
        let capacity = workers.max(1);
        Self {
            orchestrator,
            workers: Arc::new(Semaphore::new(capacity)),
            capacity,
            max_body_bytes: DEFAULT_MAX_REQUEST_BYTES,
        }
    }

    pub fn with_body_limit(mut self, bytes: usize) -> Self {
        self.max_body_bytes = bytes.max(1);
        self
    }

    /// Invocations currently holding a worker permit.
    pub fn in_flight(&self) -> usize {
        self.capacity - self.workers.available_permits().min(self.capacity)
    }
}

/// Start the Axum server and block until it exits.
pub async fn run_server(state: AppState, port: u16, bind: &str) -> Result<()> {
    let workers = state.capacity;
    let app = build_router(state);

    let addr = format!("{bind}:{port}");
    info!(workers, "Opinion analysis service listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.max_body_bytes;
    Router::new()
        .route("/health", get(health))
        .route("/api/analyze", post(handlers::analyze::analyze))
        .route("/api/status", get(handlers::status::get_status))
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Liveness probe. Always 200 once the models are loaded.
async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        axum::Json(serde_json::json!({ "status": "ok" })),
    )
}

/// Typed JSON error response helper.
pub fn api_error(status: StatusCode, message: &str) -> Response {
    (status, axum::Json(serde_json::json!({ "error": message }))).into_response()
}
