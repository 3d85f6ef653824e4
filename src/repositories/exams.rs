use sqlx::PgPool;

use crate::db::models::Exam;

pub(crate) const COLUMNS: &str = "\
    id, title, duration_minutes, total_questions, lesson_ids, level_counts, variants, \
    generation_seed, created_at";

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Exam>, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!("SELECT {COLUMNS} FROM exams WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Exams are immutable, so there is only an insert.
pub(crate) async fn insert(
    executor: impl sqlx::PgExecutor<'_>,
    exam: &Exam,
) -> Result<(), sqlx::Error> {
    sqlx::query(&format!(
        "INSERT INTO exams ({COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
    ))
    .bind(&exam.id)
    .bind(&exam.title)
    .bind(exam.duration_minutes)
    .bind(exam.total_questions)
    .bind(&exam.lesson_ids)
    .bind(&exam.level_counts)
    .bind(&exam.variants)
    .bind(exam.generation_seed)
    .bind(exam.created_at)
    .execute(executor)
    .await?;

    Ok(())
}
