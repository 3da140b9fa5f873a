//! HTTP request handlers with OpenAPI documentation.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use tracing::{debug, error};
use utoipa::OpenApi;

use crate::app::AppState;
use crate::domain::{
    AppError, AuthenticatedUser, BatchStatusResponse, CancelResponse, ContributionAccepted,
    CreateContributionRequest, CreateGoalRequest, DatabaseError, ErrorDetail, ErrorResponse,
    Goal, HealthResponse, HealthStatus, InvestmentTransaction, LedgerError, PreconditionError,
    QuoteContributionRequest, QuoteResponse, SubmitSwapRequest, SwapError,
};

/// OpenAPI documentation structure
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Solana Goal Engine API",
        version = "0.1.0",
        description = "API for goal-based recurring investment on Solana",
        contact(
            name = "API Support",
            email = "support@example.com"
        ),
        license(
            name = "MIT"
        )
    ),
    paths(
        create_goal_handler,
        list_goals_handler,
        get_goal_handler,
        pause_goal_handler,
        resume_goal_handler,
        create_contribution_handler,
        confirm_onramp_handler,
        quote_contribution_handler,
        submit_swap_handler,
        get_contribution_handler,
        cancel_contribution_handler,
        health_check_handler,
        liveness_handler,
        readiness_handler,
    ),
    components(
        schemas(
            Goal,
            CreateGoalRequest,
            crate::domain::GoalStatus,
            crate::domain::ContributionFrequency,
            crate::domain::InvestmentState,
            crate::domain::StepType,
            crate::domain::NextAction,
            InvestmentTransaction,
            CreateContributionRequest,
            ContributionAccepted,
            QuoteContributionRequest,
            QuoteResponse,
            crate::domain::SwapQuote,
            SubmitSwapRequest,
            BatchStatusResponse,
            CancelResponse,
            HealthResponse,
            HealthStatus,
            ErrorResponse,
            ErrorDetail,
        )
    ),
    tags(
        (name = "goals", description = "Accumulation goal management endpoints"),
        (name = "contributions", description = "Contribution lifecycle endpoints"),
        (name = "health", description = "Health check endpoints")
    )
)]
pub struct ApiDoc;

/// Resolve the caller's identity from forwarded gateway headers.
pub(crate) fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<AuthenticatedUser, AppError> {
    let user_id = headers.get("x-user-id").and_then(|v| v.to_str().ok());
    let two_factor = headers.get("x-mfa-verified").and_then(|v| v.to_str().ok());
    state.sessions.authenticate(user_id, two_factor)
}

/// Create a new accumulation goal
#[utoipa::path(
    post,
    path = "/goals",
    tag = "goals",
    request_body = CreateGoalRequest,
    responses(
        (status = 200, description = "Goal created", body = Goal),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 401, description = "Missing or invalid identity", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn create_goal_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CreateGoalRequest>,
) -> Result<Json<Goal>, AppError> {
    let user = authenticate(&state, &headers)?;
    let goal = state.goals.create_goal(&user, &payload).await?;
    Ok(Json(goal))
}

/// List the caller's goals
#[utoipa::path(
    get,
    path = "/goals",
    tag = "goals",
    responses(
        (status = 200, description = "Goals owned by the caller", body = Vec<Goal>),
        (status = 401, description = "Missing or invalid identity", body = ErrorResponse)
    )
)]
pub async fn list_goals_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Goal>>, AppError> {
    let user = authenticate(&state, &headers)?;
    let goals = state.goals.list_goals(&user).await?;
    Ok(Json(goals))
}

/// Get a single goal by ID
#[utoipa::path(
    get,
    path = "/goals/{id}",
    tag = "goals",
    params(
        ("id" = String, Path, description = "Goal ID")
    ),
    responses(
        (status = 200, description = "Goal found", body = Goal),
        (status = 404, description = "Goal not found", body = ErrorResponse)
    )
)]
pub async fn get_goal_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Goal>, AppError> {
    let user = authenticate(&state, &headers)?;
    let goal = state.goals.get_goal(&user, &id).await?;
    Ok(Json(goal))
}

/// Pause an active goal
#[utoipa::path(
    post,
    path = "/goals/{id}/pause",
    tag = "goals",
    params(
        ("id" = String, Path, description = "Goal ID")
    ),
    responses(
        (status = 200, description = "Goal paused", body = Goal),
        (status = 404, description = "Goal not found", body = ErrorResponse),
        (status = 409, description = "Goal is not in a pausable state", body = ErrorResponse)
    )
)]
pub async fn pause_goal_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Goal>, AppError> {
    let user = authenticate(&state, &headers)?;
    let goal = state.goals.pause_goal(&user, &id).await?;
    Ok(Json(goal))
}

/// Resume a paused goal
#[utoipa::path(
    post,
    path = "/goals/{id}/resume",
    tag = "goals",
    params(
        ("id" = String, Path, description = "Goal ID")
    ),
    responses(
        (status = 200, description = "Goal resumed", body = Goal),
        (status = 404, description = "Goal not found", body = ErrorResponse),
        (status = 409, description = "Goal is not paused", body = ErrorResponse)
    )
)]
pub async fn resume_goal_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Goal>, AppError> {
    let user = authenticate(&state, &headers)?;
    let goal = state.goals.resume_goal(&user, &id).await?;
    Ok(Json(goal))
}

/// Create a contribution batch
///
/// Records the funding leg at `pending_onramp`. The caller-supplied
/// `batch_id` is the idempotency key: retrying the same request verbatim
/// returns the already-recorded contribution instead of creating another.
#[utoipa::path(
    post,
    path = "/contributions",
    tag = "contributions",
    request_body = CreateContributionRequest,
    responses(
        (status = 200, description = "Contribution recorded (idempotent per batch_id)", body = ContributionAccepted),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 404, description = "Goal not found", body = ErrorResponse),
        (status = 409, description = "Goal is paused or completed", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn create_contribution_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CreateContributionRequest>,
) -> Result<Json<ContributionAccepted>, AppError> {
    let user = authenticate(&state, &headers)?;
    let accepted = state.service.create_contribution(&user, &payload).await?;
    Ok(Json(accepted))
}

/// Record external settlement of the funding leg
#[utoipa::path(
    post,
    path = "/contributions/{batch_id}/onramp",
    tag = "contributions",
    params(
        ("batch_id" = String, Path, description = "Contribution batch ID")
    ),
    responses(
        (status = 200, description = "Onramp confirmed (idempotent)", body = InvestmentTransaction),
        (status = 404, description = "Batch not found", body = ErrorResponse),
        (status = 409, description = "Batch is past the onramp stage", body = ErrorResponse)
    )
)]
pub async fn confirm_onramp_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(batch_id): Path<String>,
) -> Result<Json<InvestmentTransaction>, AppError> {
    authenticate(&state, &headers)?;
    let transaction = state.service.confirm_onramp(&batch_id).await?;
    Ok(Json(transaction))
}

/// Obtain a swap quote and an unsigned transaction to sign
///
/// Quoting again from `quoted` or `expired` refreshes the quote in place.
#[utoipa::path(
    post,
    path = "/contributions/{batch_id}/quote",
    tag = "contributions",
    params(
        ("batch_id" = String, Path, description = "Contribution batch ID")
    ),
    request_body = QuoteContributionRequest,
    responses(
        (status = 200, description = "Quote and unsigned payload", body = QuoteResponse),
        (status = 400, description = "Invalid signer address", body = ErrorResponse),
        (status = 404, description = "Batch not found", body = ErrorResponse),
        (status = 409, description = "Batch is not quotable in its current state", body = ErrorResponse),
        (status = 502, description = "Swap service unavailable", body = ErrorResponse)
    )
)]
pub async fn quote_contribution_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(batch_id): Path<String>,
    Json(payload): Json<QuoteContributionRequest>,
) -> Result<Json<QuoteResponse>, AppError> {
    authenticate(&state, &headers)?;
    let quote = state
        .service
        .request_quote(&batch_id, &payload.signer_address)
        .await?;
    Ok(Json(quote))
}

/// Submit the client-signed swap transaction
///
/// Refused with `409 quote_expired` when the quote's validity window has
/// elapsed; request a fresh quote and sign again. Retrying after a
/// successful submission is a no-op.
#[utoipa::path(
    post,
    path = "/contributions/{batch_id}/submit",
    tag = "contributions",
    params(
        ("batch_id" = String, Path, description = "Contribution batch ID")
    ),
    request_body = SubmitSwapRequest,
    responses(
        (status = 200, description = "Swap submitted to the ledger", body = InvestmentTransaction),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 404, description = "Batch not found", body = ErrorResponse),
        (status = 409, description = "Quote expired or batch not submittable", body = ErrorResponse),
        (status = 422, description = "Ledger rejected the transaction", body = ErrorResponse),
        (status = 502, description = "Ledger entry point unavailable", body = ErrorResponse)
    )
)]
pub async fn submit_swap_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(batch_id): Path<String>,
    Json(payload): Json<SubmitSwapRequest>,
) -> Result<Json<InvestmentTransaction>, AppError> {
    authenticate(&state, &headers)?;
    let transaction = state.service.submit_signed_swap(&batch_id, &payload).await?;
    Ok(Json(transaction))
}

/// Get the derived status of a contribution batch
///
/// For a batch awaiting finality this first polls the ledger once, so a
/// confirmation observed live is applied before the status is computed.
#[utoipa::path(
    get,
    path = "/contributions/{batch_id}",
    tag = "contributions",
    params(
        ("batch_id" = String, Path, description = "Contribution batch ID")
    ),
    responses(
        (status = 200, description = "Derived batch status", body = BatchStatusResponse),
        (status = 404, description = "Batch not found", body = ErrorResponse)
    )
)]
pub async fn get_contribution_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(batch_id): Path<String>,
) -> Result<Json<BatchStatusResponse>, AppError> {
    authenticate(&state, &headers)?;
    // A ledger hiccup here must not mask the stored status; the
    // reconciliation worker will resolve the row later.
    if let Err(e) = state.service.refresh_submission(&batch_id).await {
        debug!(batch = %batch_id, error = %e, "Live refresh skipped");
    }
    let status = state.service.get_status(&batch_id).await?;
    Ok(Json(status))
}

/// Cancel a contribution batch
///
/// Allowed strictly before ledger submission. Canceling an
/// already-canceled batch succeeds as a no-op.
#[utoipa::path(
    post,
    path = "/contributions/{batch_id}/cancel",
    tag = "contributions",
    params(
        ("batch_id" = String, Path, description = "Contribution batch ID")
    ),
    responses(
        (status = 200, description = "Batch canceled (idempotent)", body = CancelResponse),
        (status = 404, description = "Batch not found", body = ErrorResponse),
        (status = 409, description = "Batch is past the point of cancellation", body = ErrorResponse)
    )
)]
pub async fn cancel_contribution_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(batch_id): Path<String>,
) -> Result<Json<CancelResponse>, AppError> {
    let user = authenticate(&state, &headers)?;
    let response = state.service.cancel(&batch_id, &user.user_id).await?;
    Ok(Json(response))
}

/// Detailed health check
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Health status", body = HealthResponse)
    )
)]
pub async fn health_check_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let health = state.service.health_check().await;
    Json(health)
}

/// Kubernetes liveness probe
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "health",
    responses(
        (status = 200, description = "Application is alive")
    )
)]
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Kubernetes readiness probe
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "health",
    responses(
        (status = 200, description = "Application is ready to serve traffic"),
        (status = 503, description = "Application is not ready")
    )
)]
pub async fn readiness_handler(State(state): State<Arc<AppState>>) -> StatusCode {
    let health = state.service.health_check().await;
    match health.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let retryable = self.is_retryable();
        let (status, error_type, message) = match &self {
            AppError::Database(db_err) => match db_err {
                DatabaseError::Connection(_) => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "database_error",
                    self.to_string(),
                ),
                DatabaseError::NotFound(_) => {
                    (StatusCode::NOT_FOUND, "not_found", self.to_string())
                }
                DatabaseError::Duplicate(_) => {
                    (StatusCode::CONFLICT, "duplicate", self.to_string())
                }
                _ => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "database_error",
                    self.to_string(),
                ),
            },
            AppError::Precondition(pre_err) => match pre_err {
                PreconditionError::QuoteExpired { .. } => {
                    (StatusCode::CONFLICT, "quote_expired", self.to_string())
                }
                PreconditionError::NotCancelable { .. } => {
                    (StatusCode::CONFLICT, "not_cancelable", self.to_string())
                }
                PreconditionError::MissingStep { .. } => {
                    (StatusCode::NOT_FOUND, "missing_step", self.to_string())
                }
                PreconditionError::InvalidTransition { .. } => (
                    StatusCode::CONFLICT,
                    "invalid_transition",
                    self.to_string(),
                ),
                PreconditionError::GoalNotAcceptingContributions { .. } => {
                    (StatusCode::CONFLICT, "goal_inactive", self.to_string())
                }
            },
            AppError::Swap(swap_err) => match swap_err {
                SwapError::Timeout(_) => {
                    (StatusCode::GATEWAY_TIMEOUT, "timeout", self.to_string())
                }
                SwapError::RateLimited(_) => (
                    StatusCode::TOO_MANY_REQUESTS,
                    "rate_limited",
                    self.to_string(),
                ),
                SwapError::Rejected(_) => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "swap_rejected",
                    self.to_string(),
                ),
                _ => (StatusCode::BAD_GATEWAY, "swap_error", self.to_string()),
            },
            AppError::Ledger(ledger_err) => match ledger_err {
                LedgerError::Timeout(_) => {
                    (StatusCode::GATEWAY_TIMEOUT, "timeout", self.to_string())
                }
                LedgerError::Rejected(_) => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "ledger_rejected",
                    self.to_string(),
                ),
                _ => (StatusCode::BAD_GATEWAY, "ledger_error", self.to_string()),
            },
            AppError::Validation(_) => (
                StatusCode::BAD_REQUEST,
                "validation_error",
                self.to_string(),
            ),
            AppError::Authentication(_) => (
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                self.to_string(),
            ),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                self.to_string(),
            ),
            AppError::NotSupported(_) => (
                StatusCode::NOT_IMPLEMENTED,
                "not_supported",
                self.to_string(),
            ),
        };

        if status.is_server_error() {
            error!(error_type = %error_type, message = %message, "Server error");
        }

        let body = Json(ErrorResponse {
            error: ErrorDetail {
                r#type: error_type.to_string(),
                message,
                retryable,
            },
        });

        (status, body).into_response()
    }
}
