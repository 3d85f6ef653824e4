use sqlx::types::Json;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::core::metrics::ASSIGNMENTS_AUTO_CLOSED;
use crate::db::models::{Assignment, AssignmentSettings};
use crate::db::types::AssignmentStatus;
use crate::repositories::{CatalogError, ExamCatalog};
use crate::services::access_codes;

const CODE_ATTEMPTS: usize = 16;

#[derive(Debug, Error)]
pub(crate) enum AssignmentError {
    #[error("assignment not found")]
    NotFound,
    #[error("exam not found")]
    ExamNotFound,
    #[error("invalid assignment: {0}")]
    Invalid(String),
    #[error("cannot move assignment from {from} to {to}")]
    InvalidTransition { from: &'static str, to: &'static str },
    #[error("could not allocate a unique access code")]
    CodeSpaceExhausted,
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Why a student may not begin a new attempt right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryDenied {
    NotPublished,
    NotStarted { starts_at: OffsetDateTime },
    Closed,
}

impl EntryDenied {
    pub(crate) fn message(&self) -> String {
        match self {
            Self::NotPublished => "Assignment is not open yet".to_string(),
            Self::NotStarted { starts_at } => {
                format!("Assignment opens at {}", crate::core::time::format_offset(*starts_at))
            }
            Self::Closed => "Assignment is closed".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct NewAssignment {
    pub(crate) exam_id: String,
    pub(crate) class_id: String,
    pub(crate) start_time: OffsetDateTime,
    pub(crate) end_time: OffsetDateTime,
    pub(crate) duration_minutes: Option<i32>,
    pub(crate) max_attempts: i32,
    pub(crate) settings: AssignmentSettings,
    pub(crate) publish: bool,
}

pub(crate) async fn create<C>(
    catalog: &C,
    input: NewAssignment,
    now: OffsetDateTime,
) -> Result<Assignment, AssignmentError>
where
    C: ExamCatalog + ?Sized,
{
    if input.start_time >= input.end_time {
        return Err(AssignmentError::Invalid("end_time must be after start_time".to_string()));
    }
    if input.max_attempts < 1 {
        return Err(AssignmentError::Invalid("max_attempts must be at least 1".to_string()));
    }
    if matches!(input.duration_minutes, Some(minutes) if minutes <= 0) {
        return Err(AssignmentError::Invalid("duration_minutes must be positive".to_string()));
    }
    if input.class_id.trim().is_empty() {
        return Err(AssignmentError::Invalid("class_id must not be empty".to_string()));
    }
    if catalog.find_exam(&input.exam_id).await?.is_none() {
        return Err(AssignmentError::ExamNotFound);
    }

    let status = if input.publish { AssignmentStatus::Open } else { AssignmentStatus::Draft };
    let mut assignment = Assignment {
        id: Uuid::new_v4().to_string(),
        exam_id: input.exam_id,
        class_id: input.class_id.trim().to_string(),
        code: String::new(),
        status,
        start_time: input.start_time,
        end_time: input.end_time,
        duration_minutes: input.duration_minutes,
        max_attempts: input.max_attempts,
        settings: Json(input.settings),
        created_at: now,
        updated_at: now,
    };

    for _ in 0..CODE_ATTEMPTS {
        let code = access_codes::generate_access_code();
        if catalog.access_code_exists(&code).await? {
            continue;
        }

        assignment.code = code;
        match catalog.insert_assignment(&assignment).await {
            Ok(()) => {
                tracing::info!(
                    assignment_id = %assignment.id,
                    exam_id = %assignment.exam_id,
                    status = assignment.status.as_str(),
                    "assignment created"
                );
                return Ok(assignment);
            }
            // Lost a race for the same code.
            Err(CatalogError::Conflict(_)) => continue,
            Err(err) => return Err(err.into()),
        }
    }

    Err(AssignmentError::CodeSpaceExhausted)
}

pub(crate) async fn publish<C>(
    catalog: &C,
    id: &str,
    now: OffsetDateTime,
) -> Result<Assignment, AssignmentError>
where
    C: ExamCatalog + ?Sized,
{
    let current = catalog.find_assignment(id).await?.ok_or(AssignmentError::NotFound)?;
    if current.status != AssignmentStatus::Draft {
        return Err(AssignmentError::InvalidTransition {
            from: current.status.as_str(),
            to: AssignmentStatus::Open.as_str(),
        });
    }

    transition(catalog, id, AssignmentStatus::Open, now).await
}

pub(crate) async fn close<C>(
    catalog: &C,
    id: &str,
    now: OffsetDateTime,
) -> Result<Assignment, AssignmentError>
where
    C: ExamCatalog + ?Sized,
{
    let current = catalog.find_assignment(id).await?.ok_or(AssignmentError::NotFound)?;
    if current.status == AssignmentStatus::Closed {
        return Err(AssignmentError::InvalidTransition {
            from: AssignmentStatus::Closed.as_str(),
            to: AssignmentStatus::Closed.as_str(),
        });
    }

    transition(catalog, id, AssignmentStatus::Closed, now).await
}

/// Status as students see it: an open assignment whose window has passed counts as closed even
/// before the sweep persists that.
pub(crate) fn effective_status(assignment: &Assignment, now: OffsetDateTime) -> AssignmentStatus {
    match assignment.status {
        AssignmentStatus::Open if now > assignment.end_time => AssignmentStatus::Closed,
        status => status,
    }
}

/// Whether a new attempt may begin at `now`.
pub(crate) fn check_window(assignment: &Assignment, now: OffsetDateTime) -> Result<(), EntryDenied> {
    match effective_status(assignment, now) {
        AssignmentStatus::Draft => Err(EntryDenied::NotPublished),
        AssignmentStatus::Closed => Err(EntryDenied::Closed),
        AssignmentStatus::Open if now < assignment.start_time => {
            Err(EntryDenied::NotStarted { starts_at: assignment.start_time })
        }
        AssignmentStatus::Open => Ok(()),
    }
}

pub(crate) async fn find_by_code<C>(catalog: &C, raw: &str) -> Result<Assignment, AssignmentError>
where
    C: ExamCatalog + ?Sized,
{
    let code = access_codes::normalize_access_code(raw);
    if !access_codes::is_well_formed(&code) {
        return Err(AssignmentError::NotFound);
    }

    catalog.find_assignment_by_code(&code).await?.ok_or(AssignmentError::NotFound)
}

pub(crate) async fn close_expired<C>(catalog: &C, now: OffsetDateTime) -> Result<u64, CatalogError>
where
    C: ExamCatalog + ?Sized,
{
    let closed = catalog.close_expired_assignments(now).await?;
    if closed > 0 {
        tracing::info!(closed, "closed assignments past their window");
        metrics::counter!(ASSIGNMENTS_AUTO_CLOSED).increment(closed);
    }
    Ok(closed)
}

async fn transition<C>(
    catalog: &C,
    id: &str,
    status: AssignmentStatus,
    now: OffsetDateTime,
) -> Result<Assignment, AssignmentError>
where
    C: ExamCatalog + ?Sized,
{
    let updated = catalog
        .update_assignment_status(id, status, now)
        .await?
        .ok_or(AssignmentError::NotFound)?;
    tracing::info!(assignment_id = %id, status = status.as_str(), "assignment status changed");
    Ok(updated)
}
