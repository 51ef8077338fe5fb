//! Application state shared across all handlers.

use metrics_exporter_prometheus::PrometheusHandle;

use crate::config::Config;
use crate::services::{SubmissionService, WebhookService};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Config,
    /// N8N webhook dispatcher
    pub webhook_service: WebhookService,
    /// Submission records for dispatched steps
    pub submission_service: SubmissionService,
    /// Prometheus render handle, absent when no recorder was installed
    pub metrics_handle: Option<PrometheusHandle>,
}

impl axum::extract::FromRef<AppState> for SubmissionService {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.submission_service.clone()
    }
}

impl axum::extract::FromRef<AppState> for WebhookService {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.webhook_service.clone()
    }
}
