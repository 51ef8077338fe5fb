use axum::{
    extract::{Path, State},
    response::Json,
};

use crate::error::ApiError;
use crate::models::Submission;
use crate::services::SubmissionService;

/// GET /api/v1/submissions
pub async fn list_submissions(
    State(submissions): State<SubmissionService>,
) -> Json<Vec<Submission>> {
    Json(submissions.list())
}

/// GET /api/v1/submissions/{id}
pub async fn get_submission(
    State(submissions): State<SubmissionService>,
    Path(id): Path<String>,
) -> Result<Json<Submission>, ApiError> {
    submissions
        .get(&id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Submission"))
}
