//! HTTP API for the Scribe service.
//!
//! This module provides the REST API endpoints for:
//! - Health and metrics monitoring
//! - Document upload, extraction results and downloads (uploader role)
//! - Storage-write event delivery (worker role)

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::error::format_error_chain_ref;
use crate::events::StorageEvent;
use crate::service::ScribeService;

pub mod documents;
pub mod events;
use documents::{
    cancel_wait_handler, download_pdf_handler, download_text_handler, get_document_handler,
    upload_document_handler, wait_for_document_handler,
};
use events::storage_event_handler;

/// Room for multipart boundaries and headers on top of the file itself
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Application state
pub struct AppState {
    pub service: Arc<ScribeService>,
    pub start_time: Instant,
    pub metrics: Option<PrometheusHandle>,
    /// Worker queue that received storage events are handed to
    pub events: Option<mpsc::Sender<StorageEvent>>,
}

/// Build the API router; routes are mounted according to the configured role
pub fn router(
    service: Arc<ScribeService>,
    metrics: Option<PrometheusHandle>,
    events: Option<mpsc::Sender<StorageEvent>>,
) -> Router {
    let role = service.config.role;
    let max_body_size =
        service.config.uploader.max_upload_bytes as usize + MULTIPART_OVERHEAD_BYTES;

    let state = Arc::new(AppState {
        service,
        start_time: Instant::now(),
        metrics,
        events,
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut app = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler));

    if role.runs_uploader() {
        app = app
            .route(
                "/api/documents",
                post(upload_document_handler).layer(DefaultBodyLimit::max(max_body_size)),
            )
            .route("/api/documents/{key}", get(get_document_handler))
            .route("/api/documents/{key}/text", get(download_text_handler))
            .route("/api/documents/{key}/pdf", get(download_pdf_handler))
            .route(
                "/api/documents/{key}/wait",
                get(wait_for_document_handler).delete(cancel_wait_handler),
            );
    }
    if role.runs_worker() {
        app = app.route("/api/events/storage", post(storage_event_handler));
    }

    app
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// === Health & Metrics ===

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let records = match state.service.records.count() {
        Ok(count) => Some(count),
        Err(e) => {
            warn!(error = %format_error_chain_ref(&e), "Record store health check failed");
            None
        }
    };

    Json(HealthResponse {
        status: if records.is_some() { "healthy" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        role: state.service.config.role.as_str(),
        records,
        active_waits: state.service.active_waits(),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: String,
    uptime_seconds: u64,
    role: &'static str,
    records: Option<usize>,
    active_waits: usize,
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let body = state
        .metrics
        .as_ref()
        .map(PrometheusHandle::render)
        .unwrap_or_default();

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}
