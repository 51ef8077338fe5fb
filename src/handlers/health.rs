use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;
use crate::models::Step;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub version: String,
    pub environment: String,
    pub configured_steps: Vec<Step>,
    pub missing_steps: Vec<Step>,
    pub persistence: String,
}

impl HealthStatus {
    pub fn from_state(state: &AppState) -> Self {
        let configured_steps = state.webhook_service.config().configured_steps();
        let missing_steps: Vec<Step> = Step::ALL
            .into_iter()
            .filter(|step| !configured_steps.contains(step))
            .collect();

        Self {
            // Missing webhooks only break their own step
            status: if missing_steps.is_empty() {
                "healthy".to_string()
            } else {
                "degraded".to_string()
            },
            timestamp: chrono::Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            environment: state.config.environment.clone(),
            configured_steps,
            missing_steps,
            persistence: if state.submission_service.is_persistent() {
                "file".to_string()
            } else {
                "memory".to_string()
            },
        }
    }
}

/// Basic health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(HealthStatus::from_state(&state))
}
