use sqlx::PgPool;

use crate::db::models::Question;
use crate::db::types::CognitiveLevel;

pub(crate) const COLUMNS: &str = "id, lesson_id, level, content, options, used_count, correct_count";

pub(crate) async fn count_available(
    pool: &PgPool,
    lesson_ids: &[String],
    level: CognitiveLevel,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM questions WHERE lesson_id = ANY($1) AND level = $2")
        .bind(lesson_ids)
        .bind(level)
        .fetch_one(pool)
        .await
}

pub(crate) async fn list_available_ids(
    pool: &PgPool,
    lesson_ids: &[String],
    level: CognitiveLevel,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT id FROM questions WHERE lesson_id = ANY($1) AND level = $2 \
         ORDER BY created_at, id",
    )
    .bind(lesson_ids)
    .bind(level)
    .fetch_all(pool)
    .await
}

pub(crate) async fn find_by_ids(pool: &PgPool, ids: &[String]) -> Result<Vec<Question>, sqlx::Error> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    sqlx::query_as::<_, Question>(&format!("SELECT {COLUMNS} FROM questions WHERE id = ANY($1)"))
        .bind(ids)
        .fetch_all(pool)
        .await
}

pub(crate) async fn record_usage(
    executor: impl sqlx::PgExecutor<'_>,
    question_ids: &[String],
    correct: &[bool],
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE questions AS q \
         SET used_count = q.used_count + 1, \
             correct_count = q.correct_count + CASE WHEN u.correct THEN 1 ELSE 0 END \
         FROM UNNEST($1::text[], $2::bool[]) AS u(id, correct) \
         WHERE q.id = u.id",
    )
    .bind(question_ids)
    .bind(correct)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}
