use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};

use crate::api::errors::ApiError;
use crate::api::guards::CurrentAdmin;
use crate::core::state::AppState;
use crate::schemas::exam::{AvailabilityQuery, AvailabilityResponse};
use crate::services::blueprint;

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/availability", get(availability))
}

/// Per-level pool sizes, so the selection matrix can be bounded before generating.
async fn availability(
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<AvailabilityResponse>, ApiError> {
    let lesson_ids = query.lesson_ids();
    if lesson_ids.is_empty() {
        return Err(ApiError::BadRequest("lesson_ids must not be empty".to_string()));
    }

    let levels = blueprint::availability(state.catalog().as_ref(), &lesson_ids).await?;
    let total = levels.values().sum();

    Ok(Json(AvailabilityResponse { lesson_ids, levels, total }))
}
