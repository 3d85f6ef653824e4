use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{CurrentAdmin, CurrentUser};
use crate::core::clock::Clock;
use crate::core::state::AppState;
use crate::schemas::assignment::{AssignmentCreate, AssignmentEntryResponse, AssignmentResponse};
use crate::services::assignment_lifecycle::{self, NewAssignment};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_assignment))
        .route("/code/:code", get(entry_by_code))
        .route("/:assignment_id", get(get_assignment))
        .route("/:assignment_id/publish", post(publish_assignment))
        .route("/:assignment_id/close", post(close_assignment))
}

async fn create_assignment(
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
    Json(payload): Json<AssignmentCreate>,
) -> Result<(StatusCode, Json<AssignmentResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let now = state.clock().now();
    let assignment = assignment_lifecycle::create(
        state.catalog().as_ref(),
        NewAssignment {
            exam_id: payload.exam_id,
            class_id: payload.class_id,
            start_time: payload.start_time,
            end_time: payload.end_time,
            duration_minutes: payload.duration_minutes,
            max_attempts: payload.max_attempts,
            settings: payload.settings,
            publish: payload.publish,
        },
        now,
    )
    .await?;
    tracing::info!(assignment_id = %assignment.id, admin_id = %admin.id, "assignment stored");

    let effective = assignment_lifecycle::effective_status(&assignment, now);
    Ok((StatusCode::CREATED, Json(AssignmentResponse::from_assignment(assignment, effective))))
}

async fn get_assignment(
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
    Path(assignment_id): Path<String>,
) -> Result<Json<AssignmentResponse>, ApiError> {
    let assignment = state
        .catalog()
        .find_assignment(&assignment_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Assignment not found".to_string()))?;

    let effective = assignment_lifecycle::effective_status(&assignment, state.clock().now());
    Ok(Json(AssignmentResponse::from_assignment(assignment, effective)))
}

async fn publish_assignment(
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
    Path(assignment_id): Path<String>,
) -> Result<Json<AssignmentResponse>, ApiError> {
    let now = state.clock().now();
    let assignment =
        assignment_lifecycle::publish(state.catalog().as_ref(), &assignment_id, now).await?;

    let effective = assignment_lifecycle::effective_status(&assignment, now);
    Ok(Json(AssignmentResponse::from_assignment(assignment, effective)))
}

async fn close_assignment(
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
    Path(assignment_id): Path<String>,
) -> Result<Json<AssignmentResponse>, ApiError> {
    let now = state.clock().now();
    let assignment =
        assignment_lifecycle::close(state.catalog().as_ref(), &assignment_id, now).await?;

    let effective = assignment_lifecycle::effective_status(&assignment, now);
    Ok(Json(AssignmentResponse::from_assignment(assignment, effective)))
}

/// Resolves an access code for the caller and says whether a new attempt may begin.
async fn entry_by_code(
    user: CurrentUser,
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<AssignmentEntryResponse>, ApiError> {
    let catalog = state.catalog().as_ref();
    let assignment = assignment_lifecycle::find_by_code(catalog, &code).await?;
    let exam = catalog
        .find_exam(&assignment.exam_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Exam not found".to_string()))?;

    let now = state.clock().now();
    let attempts_used = catalog.list_for_attempt(&assignment.id, &user.id).await?.len();
    let limit = usize::try_from(assignment.max_attempts).unwrap_or(1);

    let reason = match assignment_lifecycle::check_window(&assignment, now) {
        Err(denied) => Some(denied.message()),
        Ok(()) if attempts_used >= limit => Some("Attempt limit reached".to_string()),
        Ok(()) => None,
    };

    Ok(Json(AssignmentEntryResponse {
        assignment_id: assignment.id.clone(),
        exam_title: exam.title.clone(),
        status: assignment_lifecycle::effective_status(&assignment, now),
        start_time: crate::core::time::format_offset(assignment.start_time),
        end_time: crate::core::time::format_offset(assignment.end_time),
        duration_minutes: assignment.effective_duration_minutes(&exam),
        total_questions: exam.total_questions,
        max_attempts: assignment.max_attempts,
        attempts_used,
        can_start: reason.is_none(),
        reason,
    }))
}

#[cfg(test)]
mod tests;
