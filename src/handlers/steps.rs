use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    response::Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{error, info, warn};

use crate::app_state::AppState;
use crate::error::{ApiError, ErrorCode};
use crate::models::{Step, StepResult, WebhookPayload};
use crate::services::submission_service::is_valid_submission_id;
use crate::services::WebhookError;

/// Form inputs for one pipeline step
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStepRequest {
    /// Reuse an existing submission instead of opening a new one
    pub submission_id: Option<String>,
    #[serde(default)]
    pub inputs: Map<String, Value>,
    /// Output of the preceding step, forwarded to the workflow as context
    pub previous_output: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStepResponse {
    pub submission_id: String,
    pub result: StepResult,
}

/// Run a strategy step through its N8N workflow
/// POST /api/v1/steps/{step}
pub async fn run_step(
    State(state): State<AppState>,
    path: Result<Path<Step>, PathRejection>,
    body: Result<Json<RunStepRequest>, JsonRejection>,
) -> Result<Json<RunStepResponse>, ApiError> {
    let Path(step) = path?;
    let Json(request) = body?;

    if let Some(id) = request.submission_id.as_deref() {
        if !is_valid_submission_id(id) {
            return Err(ApiError::with_details(
                ErrorCode::InvalidInput,
                "Invalid submissionId",
                "submissionId must be 1-128 characters of [A-Za-z0-9_-]",
            ));
        }
    }

    let submission = state
        .submission_service
        .start(request.submission_id.as_deref(), step, request.inputs)
        .await;
    info!(submission_id = %submission.id, step = %step, "Running strategy step");

    // runs detached so the outcome is recorded even if the caller disconnects
    let task = tokio::spawn(dispatch_and_record(
        state.clone(),
        step,
        submission.id.clone(),
        submission.inputs.clone(),
        request.previous_output,
    ));
    let result = task.await.map_err(|e| {
        error!(
            submission_id = %submission.id,
            step = %step,
            error = %e,
            "Step dispatch task aborted"
        );
        ApiError::with_details(
            ErrorCode::InternalServerError,
            "Step dispatch aborted",
            e.to_string(),
        )
    })??;

    Ok(Json(RunStepResponse {
        submission_id: submission.id,
        result,
    }))
}

/// Dispatch a step and store its outcome on the submission
async fn dispatch_and_record(
    state: AppState,
    step: Step,
    submission_id: String,
    inputs: Map<String, Value>,
    previous_output: Option<Value>,
) -> Result<StepResult, WebhookError> {
    let payload = WebhookPayload::new(submission_id.clone(), inputs);
    let outcome = state
        .webhook_service
        .dispatch_step(step, &payload, previous_output.as_ref())
        .await;

    let recorded = match &outcome {
        Ok(result) => {
            state
                .submission_service
                .complete(&submission_id, result)
                .await
        }
        Err(e) => {
            warn!(
                submission_id = %submission_id,
                step = %step,
                error = %e,
                "Strategy step failed"
            );
            state
                .submission_service
                .fail(&submission_id, e.to_string())
                .await
        }
    };
    if recorded.is_none() {
        warn!(
            submission_id = %submission_id,
            step = %step,
            "Submission missing when recording step outcome"
        );
    }

    outcome
}
