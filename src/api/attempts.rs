//! Student-facing attempt endpoints. Every call may land on a fresh instance, so attempts are
//! rebuilt from the persistence store whenever the in-memory registry misses.

use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json, Router,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentStudent;
use crate::core::state::AppState;
use crate::schemas::attempt::{
    AnswerSelect, AttemptOutcome, AttemptResponse, IntegrityReport, IntegrityResponse,
    ResumeChoice,
};
use crate::schemas::submission::SubmissionResponse;
use crate::services::session::{Attempt, AttemptKey, SharedSession, SignalBatch, SubmitMode};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/:assignment_id", get(current_attempt))
        .route("/:assignment_id/start", post(start_attempt))
        .route("/:assignment_id/resume", post(answer_resume_prompt))
        .route("/:assignment_id/answers", put(select_answer))
        .route("/:assignment_id/integrity", post(report_integrity))
        .route("/:assignment_id/acknowledge", post(acknowledge_violation))
        .route("/:assignment_id/submit", post(submit_attempt))
}

async fn live_attempt(
    state: &AppState,
    assignment_id: &str,
    student_id: &str,
) -> Result<SharedSession, ApiError> {
    match state.sessions().resume(&state.session_context(), assignment_id, student_id).await? {
        Attempt::Live(shared) => Ok(shared),
        Attempt::Exhausted { submission_id } => Err(ApiError::Conflict(format!(
            "Attempt limit reached; see submission {submission_id}"
        ))),
        Attempt::Submitted { submission_id, .. } => Err(ApiError::Conflict(format!(
            "Attempt already submitted; see submission {submission_id}"
        ))),
    }
}

async fn outcome(attempt: Attempt) -> AttemptOutcome {
    match attempt {
        Attempt::Live(shared) => {
            let mut session = shared.lock().await;
            session.touch();
            AttemptOutcome::Live(AttemptResponse::from_session(&session))
        }
        Attempt::Exhausted { submission_id } => AttemptOutcome::Exhausted { submission_id },
        Attempt::Submitted { submission_id, auto_submitted } => {
            AttemptOutcome::Submitted { submission_id, auto_submitted }
        }
    }
}

/// Starts the attempt, or picks it up again after a reload.
async fn start_attempt(
    CurrentStudent(student): CurrentStudent,
    State(state): State<AppState>,
    Path(assignment_id): Path<String>,
) -> Result<Json<AttemptOutcome>, ApiError> {
    let attempt =
        state.sessions().start(&state.session_context(), &assignment_id, &student.id).await?;
    Ok(Json(outcome(attempt).await))
}

async fn current_attempt(
    CurrentStudent(student): CurrentStudent,
    State(state): State<AppState>,
    Path(assignment_id): Path<String>,
) -> Result<Json<AttemptOutcome>, ApiError> {
    let attempt =
        state.sessions().resume(&state.session_context(), &assignment_id, &student.id).await?;
    Ok(Json(outcome(attempt).await))
}

async fn answer_resume_prompt(
    CurrentStudent(student): CurrentStudent,
    State(state): State<AppState>,
    Path(assignment_id): Path<String>,
    Json(payload): Json<ResumeChoice>,
) -> Result<Json<AttemptResponse>, ApiError> {
    let shared = live_attempt(&state, &assignment_id, &student.id).await?;
    let mut session = shared.lock().await;
    session.choose_resume(payload.resume).await?;
    Ok(Json(AttemptResponse::from_session(&session)))
}

async fn select_answer(
    CurrentStudent(student): CurrentStudent,
    State(state): State<AppState>,
    Path(assignment_id): Path<String>,
    Json(payload): Json<AnswerSelect>,
) -> Result<Json<AttemptResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let shared = live_attempt(&state, &assignment_id, &student.id).await?;
    let mut session = shared.lock().await;
    session.select_answer(&payload.question_id, &payload.option_id).await?;
    Ok(Json(AttemptResponse::from_session(&session)))
}

async fn report_integrity(
    CurrentStudent(student): CurrentStudent,
    State(state): State<AppState>,
    Path(assignment_id): Path<String>,
    Json(payload): Json<IntegrityReport>,
) -> Result<Json<IntegrityResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let shared = live_attempt(&state, &assignment_id, &student.id).await?;
    let mut session = shared.lock().await;
    let mut batch = SignalBatch::new(payload.signals);
    let counted = session.apply_signals(&mut batch).await;
    Ok(Json(IntegrityResponse { counted, attempt: AttemptResponse::from_session(&session) }))
}

async fn acknowledge_violation(
    CurrentStudent(student): CurrentStudent,
    State(state): State<AppState>,
    Path(assignment_id): Path<String>,
) -> Result<Json<AttemptResponse>, ApiError> {
    let shared = live_attempt(&state, &assignment_id, &student.id).await?;
    let mut session = shared.lock().await;
    session.acknowledge_violation()?;
    Ok(Json(AttemptResponse::from_session(&session)))
}

/// Manual submit. Repeating it returns the submission already made.
async fn submit_attempt(
    CurrentStudent(student): CurrentStudent,
    State(state): State<AppState>,
    Path(assignment_id): Path<String>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    let attempt =
        state.sessions().resume(&state.session_context(), &assignment_id, &student.id).await?;

    let shared = match attempt {
        Attempt::Live(shared) => shared,
        Attempt::Exhausted { submission_id } | Attempt::Submitted { submission_id, .. } => {
            let submission = state
                .catalog()
                .find_submission(&submission_id)
                .await?
                .ok_or_else(|| ApiError::NotFound("Submission not found".to_string()))?;
            let show_result = show_result_for(&state, &submission.assignment_id).await?;
            return Ok(Json(SubmissionResponse::from_submission(submission, show_result)));
        }
    };

    let (submission, show_result) = {
        let mut session = shared.lock().await;
        let submission = session.submit(SubmitMode::Manual).await?;
        (submission, session.assignment().settings.show_result)
    };
    state.sessions().remove(&AttemptKey::new(&assignment_id, &student.id)).await;

    Ok(Json(SubmissionResponse::from_submission(submission, show_result)))
}

async fn show_result_for(state: &AppState, assignment_id: &str) -> Result<bool, ApiError> {
    Ok(state
        .catalog()
        .find_assignment(assignment_id)
        .await?
        .map(|assignment| assignment.settings.show_result)
        .unwrap_or(false))
}
