//! HTTP API for submitting scans and polling their status.
//!
//! Provides:
//! - `POST /api/scan` - submit a scan, dispatched onto a background task
//! - `GET /api/scan/{id}` - snapshot of one scan, including live output
//! - `GET /api/status` - daemon liveness and tracked-scan count

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::executor::ScanExecutor;
use crate::registry::{ScanJob, ScanRegistry};
use ssr_common::types::{ErrorReply, LivenessReply, StatusReply, SubmitReply};
use ssr_common::{ScanId, ScanRequest, SsrConfig};

/// Shared state for HTTP handlers.
#[derive(Clone)]
pub struct ServiceContext {
    /// Job table shared with every executor task.
    pub registry: Arc<ScanRegistry>,
    /// Immutable daemon configuration.
    pub config: Arc<SsrConfig>,
    /// Daemon start time.
    pub started_at: Instant,
    /// Daemon version.
    pub version: &'static str,
    /// Daemon PID.
    pub pid: u32,
}

/// Create the HTTP router for the scan API.
///
/// CORS is permissive: browser UIs for this service are typically
/// served from a different origin.
pub fn create_router(context: ServiceContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/scan", post(submit_handler))
        .route("/api/scan/{id}", get(status_handler))
        .route("/api/status", get(liveness_handler))
        .layer(cors)
        .with_state(Arc::new(context))
}

/// Handler for `POST /api/scan` - validate, register, dispatch.
///
/// Validation failures reject the request before any job exists; a
/// successful reply means the scan id is already queryable.
async fn submit_handler(
    State(context): State<Arc<ServiceContext>>,
    Json(request): Json<ScanRequest>,
) -> Response {
    let request = match request.validated() {
        Ok(request) => request,
        Err(err) => {
            return (StatusCode::BAD_REQUEST, Json(ErrorReply::new(err.to_string())))
                .into_response();
        }
    };

    let id = context.registry.allocate_id(&request.repository, &request.branch);
    let job = ScanJob::new(
        id.clone(),
        request.repository.clone(),
        request.branch.clone(),
        request.version.clone(),
    );
    if let Err(err) = context.registry.register(job) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorReply::new(err.to_string())),
        )
            .into_response();
    }

    info!("scan {id} submitted for {}@{}", request.repository, request.branch);
    let executor = ScanExecutor::new(Arc::clone(&context.registry), Arc::clone(&context.config));
    executor.spawn(id.clone(), request.repository, request.branch, request.version);

    Json(SubmitReply {
        status: "success".to_string(),
        message: "scan started".to_string(),
        scan_id: id,
    })
    .into_response()
}

/// Handler for `GET /api/scan/{id}` - copied snapshot, even mid-run.
async fn status_handler(
    State(context): State<Arc<ServiceContext>>,
    Path(id): Path<String>,
) -> Response {
    let id = ScanId::new(id);
    match context.registry.snapshot(&id) {
        Some(snapshot) => Json(StatusReply::from_snapshot(snapshot)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorReply::new(format!("scan {id} not found"))),
        )
            .into_response(),
    }
}

/// Handler for `GET /api/status` - process liveness and job count.
async fn liveness_handler(State(context): State<Arc<ServiceContext>>) -> Json<LivenessReply> {
    Json(LivenessReply {
        status: "running".to_string(),
        timestamp: Utc::now().to_rfc3339(),
        version: context.version.to_string(),
        pid: context.pid,
        uptime_seconds: context.started_at.elapsed().as_secs(),
        active_scans: context.registry.count(),
    })
}
