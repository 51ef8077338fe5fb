//! Router configuration - v1 API for strategy steps and submissions.

use axum::{
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::app_state::AppState;
use crate::handlers;
use crate::middleware;

/// Slack on top of the worst-case webhook time before the gateway gives up
const REQUEST_TIMEOUT_SLACK: Duration = Duration::from_secs(30);

/// Build the application router.
pub fn build_router(app_state: AppState) -> Router {
    let request_timeout = worst_case_dispatch(&app_state) + REQUEST_TIMEOUT_SLACK;

    let health = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::get_prometheus_metrics));

    let v1_api = Router::new()
        .route("/steps/{step}", post(handlers::run_step))
        .route("/submissions", get(handlers::list_submissions))
        .route("/submissions/{id}", get(handlers::get_submission));

    health
        .nest("/api/v1", v1_api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::with_status_code(
                    axum::http::StatusCode::REQUEST_TIMEOUT,
                    request_timeout,
                ))
                .layer(CorsLayer::permissive())
                .layer(from_fn(middleware::request_logger_middleware))
                .layer(from_fn(middleware::metrics_middleware)),
        )
        .with_state(app_state)
}

/// Every attempt timing out plus every backoff sleep
fn worst_case_dispatch(app_state: &AppState) -> Duration {
    let policy = app_state.webhook_service.policy();
    let attempts = policy.total_attempts();
    let sleeps: Duration = (0..policy.max_retries)
        .map(|attempt| policy.compute_backoff_delay(attempt))
        .sum();
    policy.timeout * attempts + sleeps
}
