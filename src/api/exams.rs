use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentAdmin;
use crate::core::clock::Clock;
use crate::core::state::AppState;
use crate::schemas::exam::{ExamGenerate, ExamResponse};
use crate::services::blueprint::{self, BlueprintOptions, ExamDraft, SelectionMatrix};
use crate::services::shuffle::SeededShuffle;

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/generate", post(generate_exam)).route("/:exam_id", get(get_exam))
}

async fn generate_exam(
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
    Json(payload): Json<ExamGenerate>,
) -> Result<(StatusCode, Json<ExamResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let draft = ExamDraft { title: payload.title, duration_minutes: payload.duration_minutes };
    let matrix = SelectionMatrix {
        lesson_ids: payload.lesson_ids,
        counts: payload.level_counts,
        variant_count: payload.variant_count,
    };
    // Each exam gets its own seed so the stored one reproduces exactly this draw.
    let shuffle = match payload.seed {
        Some(seed) => SeededShuffle::from_seed(seed),
        None => SeededShuffle::from_entropy(),
    };

    let exam = blueprint::generate(
        state.catalog().as_ref(),
        &shuffle,
        draft,
        &matrix,
        BlueprintOptions::from_settings(state.settings()),
        state.clock().now(),
    )
    .await?;

    state.catalog().insert_exam(&exam).await?;
    tracing::info!(exam_id = %exam.id, admin_id = %admin.id, "exam stored");

    Ok((StatusCode::CREATED, Json(ExamResponse::from(exam))))
}

async fn get_exam(
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
    Path(exam_id): Path<String>,
) -> Result<Json<ExamResponse>, ApiError> {
    let exam = state
        .catalog()
        .find_exam(&exam_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Exam not found".to_string()))?;

    Ok(Json(ExamResponse::from(exam)))
}

#[cfg(test)]
mod tests;
