//! Operator endpoints.

use std::sync::Arc;

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::app::AppState;
use crate::domain::AppError;

/// Parameters for an on-demand reconciliation sweep
#[derive(Debug, Deserialize, ToSchema)]
pub struct ReconcileRequest {
    /// Minimum age in seconds before an in-flight submission is eligible
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: i64,
    /// Maximum rows to process in this sweep
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,
}

fn default_stale_after() -> i64 {
    60
}

fn default_batch_size() -> i64 {
    20
}

impl Default for ReconcileRequest {
    fn default() -> Self {
        Self {
            stale_after_secs: default_stale_after(),
            batch_size: default_batch_size(),
        }
    }
}

/// Result of an on-demand reconciliation sweep
#[derive(Debug, Serialize, ToSchema)]
pub struct ReconcileResponse {
    /// Rows moved to a terminal state during this sweep
    pub resolved: usize,
}

/// Run one reconciliation sweep immediately
///
/// Rediscovers stale submitted swaps from persisted state and resolves
/// each against the ledger. Safe to call while the background worker is
/// running; both paths share the same compare-and-set transitions.
#[utoipa::path(
    post,
    path = "/admin/reconcile",
    tag = "admin",
    request_body = ReconcileRequest,
    responses(
        (status = 200, description = "Sweep complete", body = ReconcileResponse),
        (status = 503, description = "Database unavailable", body = crate::domain::ErrorResponse)
    )
)]
pub async fn reconcile_handler(
    State(state): State<Arc<AppState>>,
    payload: Option<Json<ReconcileRequest>>,
) -> Result<Json<ReconcileResponse>, AppError> {
    let Json(request) = payload.unwrap_or_default();
    let resolved = state
        .service
        .reconcile_stale(request.stale_after_secs, request.batch_size)
        .await?;
    Ok(Json(ReconcileResponse { resolved }))
}
