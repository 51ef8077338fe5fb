//! Application startup and initialization logic.

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::config::{Config, LogFormat};
use crate::services::{SubmissionService, WebhookService};

/// Install the global tracing subscriber.
pub fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "strategy_gateway={},tower_http=info",
            config.log_level
        )
        .into()
    });

    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(false)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

/// Initialize application services and create the AppState.
pub async fn initialize_app(config: &Config) -> Result<AppState> {
    info!("🚀 Starting strategy gateway ({})", config.environment);

    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus recorder: {}", e))?;
    info!("✅ Prometheus metrics initialized");

    let mut app_state = build_state(config).await?;
    app_state.metrics_handle = Some(metrics_handle);

    Ok(app_state)
}

/// Build the AppState without touching process-wide recorders.
pub async fn build_state(config: &Config) -> Result<AppState> {
    let webhook_service = WebhookService::new(config.webhook.clone());
    let policy = webhook_service.policy();
    info!(
        "✅ Webhook service initialized (retries={}, timeout={}s, production={})",
        policy.max_retries,
        policy.timeout.as_secs(),
        config.is_production()
    );

    for step in crate::models::Step::ALL {
        if config.webhook.url_for(step).is_none() {
            warn!("Webhook for step {} is not configured ({} unset)", step, step.env_var());
        }
    }
    if config.webhook.signing_secret.is_none() {
        warn!("N8N_WEBHOOK_SIGNATURE_SECRET unset, webhook bodies will not be signed");
    }

    let submission_service = match &config.submissions_dir {
        Some(dir) => SubmissionService::with_data_dir(dir.clone()).await?,
        None => SubmissionService::in_memory(),
    };
    info!("✅ Submission service initialized");

    Ok(AppState {
        config: config.clone(),
        webhook_service,
        submission_service,
        metrics_handle: None,
    })
}
