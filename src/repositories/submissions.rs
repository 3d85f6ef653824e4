use sqlx::PgPool;

use crate::db::models::Submission;

pub(crate) const COLUMNS: &str = "\
    id, assignment_id, student_id, exam_id, variant_code, started_at, submitted_at, answers, \
    score, passed, correct_count, total_questions, violation_count, flagged_for_review, \
    auto_submitted";

pub(crate) async fn find_by_id(
    pool: &PgPool,
    id: &str,
) -> Result<Option<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!("SELECT {COLUMNS} FROM submissions WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn list_for_student(
    pool: &PgPool,
    assignment_id: &str,
    student_id: &str,
) -> Result<Vec<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "SELECT {COLUMNS} FROM submissions \
         WHERE assignment_id = $1 AND student_id = $2 \
         ORDER BY submitted_at ASC, id ASC"
    ))
    .bind(assignment_id)
    .bind(student_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn insert(
    executor: impl sqlx::PgExecutor<'_>,
    submission: &Submission,
) -> Result<(), sqlx::Error> {
    sqlx::query(&format!(
        "INSERT INTO submissions ({COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)"
    ))
    .bind(&submission.id)
    .bind(&submission.assignment_id)
    .bind(&submission.student_id)
    .bind(&submission.exam_id)
    .bind(&submission.variant_code)
    .bind(submission.started_at)
    .bind(submission.submitted_at)
    .bind(&submission.answers)
    .bind(submission.score)
    .bind(submission.passed)
    .bind(submission.correct_count)
    .bind(submission.total_questions)
    .bind(submission.violation_count)
    .bind(submission.flagged_for_review)
    .bind(submission.auto_submitted)
    .execute(executor)
    .await?;

    Ok(())
}
