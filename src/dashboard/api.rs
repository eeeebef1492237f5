//! Dashboard HTTP API
//!
//! Read endpoints for positions, summary and reconciliation, plus the
//! proposal endpoint used by the decision-maker.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use super::types::*;
use crate::engine::DeploymentEngine;
use crate::types::{AdmissionResult, DeploySpec};

/// Create the API router with all endpoints
pub fn create_router(engine: Arc<DeploymentEngine>) -> Router {
    Router::new()
        .route("/api/positions", get(get_positions))
        .route("/api/summary", get(get_summary))
        .route("/api/reconcile", get(get_reconcile))
        .route("/api/proposals", post(post_proposal))
        .with_state(engine)
        // CORS for frontend
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

// ─────────────────────────────────────────────────────────────────
// API Handlers
// ─────────────────────────────────────────────────────────────────

/// GET /api/positions - Positions from the latest tracker cycle
async fn get_positions(State(engine): State<Arc<DeploymentEngine>>) -> impl IntoResponse {
    let positions = engine.list_positions().await;
    Json(ApiResponse::success(PositionsResponse {
        count: positions.len(),
        positions,
    }))
}

/// GET /api/summary - Rolling summary and decision context
async fn get_summary(State(engine): State<Arc<DeploymentEngine>>) -> impl IntoResponse {
    Json(ApiResponse::success(SummaryResponse {
        summary: engine.get_summary().await,
        context: engine.decision_context().await,
    }))
}

/// GET /api/reconcile - Records whose write-back is still pending
async fn get_reconcile(State(engine): State<Arc<DeploymentEngine>>) -> impl IntoResponse {
    let pending = engine.pending_reconciliation().await;
    Json(ApiResponse::success(ReconcileResponse {
        count: pending.len(),
        pending,
    }))
}

/// POST /api/proposals - Submit a deployment proposal
///
/// Rejections are normal responses; executor failures map to 502 with the error text.
async fn post_proposal(
    State(engine): State<Arc<DeploymentEngine>>,
    Json(spec): Json<DeploySpec>,
) -> impl IntoResponse {
    match engine.propose_action(spec).await {
        AdmissionResult::Failed { error } => (
            StatusCode::BAD_GATEWAY,
            Json(ApiResponse::<AdmissionResult>::error(error)),
        ),
        result => (StatusCode::OK, Json(ApiResponse::success(result))),
    }
}
