//! Router assembly.

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::app::AppState;

use super::admin::reconcile_handler;
use super::handlers::{
    ApiDoc, cancel_contribution_handler, confirm_onramp_handler, create_contribution_handler,
    create_goal_handler, get_contribution_handler, get_goal_handler, health_check_handler,
    list_goals_handler, liveness_handler, pause_goal_handler, quote_contribution_handler,
    readiness_handler, resume_goal_handler, submit_swap_handler,
};

/// Build the application router with all routes and middleware.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/goals", post(create_goal_handler).get(list_goals_handler))
        .route("/goals/{id}", get(get_goal_handler))
        .route("/goals/{id}/pause", post(pause_goal_handler))
        .route("/goals/{id}/resume", post(resume_goal_handler))
        .route("/contributions", post(create_contribution_handler))
        .route("/contributions/{batch_id}", get(get_contribution_handler))
        .route(
            "/contributions/{batch_id}/onramp",
            post(confirm_onramp_handler),
        )
        .route(
            "/contributions/{batch_id}/quote",
            post(quote_contribution_handler),
        )
        .route(
            "/contributions/{batch_id}/submit",
            post(submit_swap_handler),
        )
        .route(
            "/contributions/{batch_id}/cancel",
            post(cancel_contribution_handler),
        )
        .route("/admin/reconcile", post(reconcile_handler))
        .route("/health", get(health_check_handler))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
