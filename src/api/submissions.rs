use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::core::security::Role;
use crate::core::state::AppState;
use crate::schemas::submission::SubmissionResponse;

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/:submission_id", get(get_submission))
}

/// Owners see the score only when the assignment shows results; admins always do.
async fn get_submission(
    user: CurrentUser,
    State(state): State<AppState>,
    Path(submission_id): Path<String>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    let submission = state
        .catalog()
        .find_submission(&submission_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Submission not found".to_string()))?;

    let show_result = match user.role {
        Role::Admin => true,
        Role::Student if submission.student_id == user.id => state
            .catalog()
            .find_assignment(&submission.assignment_id)
            .await?
            .map(|assignment| assignment.settings.show_result)
            .unwrap_or(false),
        // Do not reveal that someone else's submission exists.
        Role::Student => return Err(ApiError::NotFound("Submission not found".to_string())),
    };

    Ok(Json(SubmissionResponse::from_submission(submission, show_result)))
}
