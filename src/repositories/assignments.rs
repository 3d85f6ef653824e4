use sqlx::PgPool;
use time::OffsetDateTime;

use crate::db::models::Assignment;
use crate::db::types::AssignmentStatus;

pub(crate) const COLUMNS: &str = "\
    id, exam_id, class_id, code, status, start_time, end_time, duration_minutes, \
    max_attempts, settings, created_at, updated_at";

pub(crate) async fn find_by_id(
    pool: &PgPool,
    id: &str,
) -> Result<Option<Assignment>, sqlx::Error> {
    sqlx::query_as::<_, Assignment>(&format!("SELECT {COLUMNS} FROM assignments WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn find_by_code(
    pool: &PgPool,
    code: &str,
) -> Result<Option<Assignment>, sqlx::Error> {
    sqlx::query_as::<_, Assignment>(&format!("SELECT {COLUMNS} FROM assignments WHERE code = $1"))
        .bind(code)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn code_exists(pool: &PgPool, code: &str) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM assignments WHERE code = $1)")
        .bind(code)
        .fetch_one(pool)
        .await
}

pub(crate) async fn insert(
    executor: impl sqlx::PgExecutor<'_>,
    assignment: &Assignment,
) -> Result<(), sqlx::Error> {
    sqlx::query(&format!(
        "INSERT INTO assignments ({COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"
    ))
    .bind(&assignment.id)
    .bind(&assignment.exam_id)
    .bind(&assignment.class_id)
    .bind(&assignment.code)
    .bind(assignment.status)
    .bind(assignment.start_time)
    .bind(assignment.end_time)
    .bind(assignment.duration_minutes)
    .bind(assignment.max_attempts)
    .bind(&assignment.settings)
    .bind(assignment.created_at)
    .bind(assignment.updated_at)
    .execute(executor)
    .await?;

    Ok(())
}

pub(crate) async fn update_status(
    pool: &PgPool,
    id: &str,
    status: AssignmentStatus,
    now: OffsetDateTime,
) -> Result<Option<Assignment>, sqlx::Error> {
    sqlx::query_as::<_, Assignment>(&format!(
        "UPDATE assignments SET status = $2, updated_at = $3 WHERE id = $1 RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(status)
    .bind(now)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn close_expired(pool: &PgPool, now: OffsetDateTime) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE assignments SET status = $1, updated_at = $3 \
         WHERE status = $2 AND end_time < $3",
    )
    .bind(AssignmentStatus::Closed)
    .bind(AssignmentStatus::Open)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
