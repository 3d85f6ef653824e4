use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::repositories::CatalogError;
use crate::services::assignment_lifecycle::{AssignmentError, EntryDenied};
use crate::services::blueprint::{BlueprintError, LevelShortfall};
use crate::services::session::SessionError;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    shortfalls: Option<Vec<LevelShortfall>>,
}

#[derive(Debug)]
pub(crate) enum ApiError {
    Unauthorized(&'static str),
    Forbidden(&'static str),
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    /// Request was well-formed but the question pool cannot satisfy it.
    InsufficientPool(Vec<LevelShortfall>),
    ServiceUnavailable(String),
    Internal(String),
}

impl ApiError {
    /// Log the underlying error with context and return an `Internal` variant.
    pub(crate) fn internal(err: impl std::fmt::Display, context: &str) -> Self {
        tracing::error!(error = %err, "{context}");
        Self::Internal(context.to_string())
    }
}

fn json_error(status: StatusCode, detail: String) -> Response {
    (status, Json(ErrorResponse { status: status.as_u16(), detail, shortfalls: None }))
        .into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized(message) => {
                let mut response = json_error(StatusCode::UNAUTHORIZED, message.to_string());
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
                response
            }
            ApiError::Forbidden(message) => json_error(StatusCode::FORBIDDEN, message.to_string()),
            ApiError::BadRequest(message) => json_error(StatusCode::BAD_REQUEST, message),
            ApiError::NotFound(message) => json_error(StatusCode::NOT_FOUND, message),
            ApiError::Conflict(message) => json_error(StatusCode::CONFLICT, message),
            ApiError::InsufficientPool(shortfalls) => {
                let status = StatusCode::UNPROCESSABLE_ENTITY;
                let detail = "Question pool is too small for the requested matrix".to_string();
                (
                    status,
                    Json(ErrorResponse {
                        status: status.as_u16(),
                        detail,
                        shortfalls: Some(shortfalls),
                    }),
                )
                    .into_response()
            }
            ApiError::ServiceUnavailable(message) => {
                tracing::error!(error = %message, "Service unavailable");
                json_error(StatusCode::SERVICE_UNAVAILABLE, message)
            }
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "Internal server error");
                json_error(StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        }
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Conflict(message) => ApiError::Conflict(message),
            CatalogError::Unavailable(message) => ApiError::ServiceUnavailable(message),
            CatalogError::Database(err) => ApiError::internal(err, "Database error"),
        }
    }
}

impl From<BlueprintError> for ApiError {
    fn from(err: BlueprintError) -> Self {
        match err {
            BlueprintError::InsufficientPool(shortfalls) => ApiError::InsufficientPool(shortfalls),
            BlueprintError::InvalidMatrix(message) => ApiError::BadRequest(message),
            BlueprintError::Catalog(err) => err.into(),
        }
    }
}

impl From<AssignmentError> for ApiError {
    fn from(err: AssignmentError) -> Self {
        match err {
            AssignmentError::NotFound => ApiError::NotFound("Assignment not found".to_string()),
            AssignmentError::ExamNotFound => ApiError::NotFound("Exam not found".to_string()),
            AssignmentError::Invalid(message) => ApiError::BadRequest(message),
            err @ AssignmentError::InvalidTransition { .. } => ApiError::Conflict(err.to_string()),
            AssignmentError::CodeSpaceExhausted => {
                ApiError::ServiceUnavailable("Could not allocate an access code".to_string())
            }
            AssignmentError::Catalog(err) => err.into(),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::AssignmentNotFound => {
                ApiError::NotFound("Assignment not found".to_string())
            }
            SessionError::ExamNotFound => ApiError::NotFound("Exam not found".to_string()),
            SessionError::NoAttemptInProgress => {
                ApiError::NotFound("No attempt in progress".to_string())
            }
            SessionError::Unavailable(denied) => ApiError::Forbidden(match denied {
                EntryDenied::NotPublished => "Assignment is not open yet",
                EntryDenied::NotStarted { .. } => "Assignment has not started yet",
                EntryDenied::Closed => "Assignment is closed",
            }),
            SessionError::EmptyVariant => {
                ApiError::internal("variant resolved to no questions", "Exam has no questions")
            }
            err @ (SessionError::UnknownQuestion(_) | SessionError::UnknownOption { .. }) => {
                ApiError::BadRequest(err.to_string())
            }
            err @ SessionError::InvalidPhase(_) => ApiError::Conflict(err.to_string()),
            SessionError::SubmissionFailed(err) => {
                tracing::error!(error = %err, "Submission append failed");
                ApiError::ServiceUnavailable(
                    "Submission could not be saved; please retry".to_string(),
                )
            }
            SessionError::Catalog(err) => err.into(),
        }
    }
}
