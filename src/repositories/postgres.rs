use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;

use crate::db::models::{Assignment, Exam, Question, Submission};
use crate::db::types::{AssignmentStatus, CognitiveLevel};
use crate::repositories::{
    assignments, exams, health, questions, submissions, CatalogError, ExamCatalog, QuestionPool,
    QuestionUsage, SubmissionLedger,
};

/// Postgres-backed catalog and submission ledger.
#[derive(Clone)]
pub(crate) struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QuestionPool for PgCatalog {
    async fn count_available(
        &self,
        lesson_ids: &[String],
        level: CognitiveLevel,
    ) -> Result<u64, CatalogError> {
        let count = questions::count_available(&self.pool, lesson_ids, level).await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn list_available(
        &self,
        lesson_ids: &[String],
        level: CognitiveLevel,
    ) -> Result<Vec<String>, CatalogError> {
        Ok(questions::list_available_ids(&self.pool, lesson_ids, level).await?)
    }
}

#[async_trait]
impl ExamCatalog for PgCatalog {
    async fn find_exam(&self, id: &str) -> Result<Option<Exam>, CatalogError> {
        Ok(exams::find_by_id(&self.pool, id).await?)
    }

    async fn insert_exam(&self, exam: &Exam) -> Result<(), CatalogError> {
        exams::insert(&self.pool, exam).await.map_err(|err| map_unique(err, "exam id"))
    }

    async fn find_questions(&self, ids: &[String]) -> Result<Vec<Question>, CatalogError> {
        Ok(questions::find_by_ids(&self.pool, ids).await?)
    }

    async fn record_question_usage(&self, usage: &[QuestionUsage]) -> Result<(), CatalogError> {
        if usage.is_empty() {
            return Ok(());
        }

        let ids: Vec<String> = usage.iter().map(|entry| entry.question_id.clone()).collect();
        let correct: Vec<bool> = usage.iter().map(|entry| entry.correct).collect();
        questions::record_usage(&self.pool, &ids, &correct).await?;
        Ok(())
    }

    async fn find_assignment(&self, id: &str) -> Result<Option<Assignment>, CatalogError> {
        Ok(assignments::find_by_id(&self.pool, id).await?)
    }

    async fn find_assignment_by_code(
        &self,
        code: &str,
    ) -> Result<Option<Assignment>, CatalogError> {
        Ok(assignments::find_by_code(&self.pool, code).await?)
    }

    async fn access_code_exists(&self, code: &str) -> Result<bool, CatalogError> {
        Ok(assignments::code_exists(&self.pool, code).await?)
    }

    async fn insert_assignment(&self, assignment: &Assignment) -> Result<(), CatalogError> {
        assignments::insert(&self.pool, assignment)
            .await
            .map_err(|err| map_unique(err, "assignment access code"))
    }

    async fn update_assignment_status(
        &self,
        id: &str,
        status: AssignmentStatus,
        now: OffsetDateTime,
    ) -> Result<Option<Assignment>, CatalogError> {
        Ok(assignments::update_status(&self.pool, id, status, now).await?)
    }

    async fn close_expired_assignments(&self, now: OffsetDateTime) -> Result<u64, CatalogError> {
        Ok(assignments::close_expired(&self.pool, now).await?)
    }

    async fn ping(&self) -> Result<(), CatalogError> {
        Ok(health::ping(&self.pool).await?)
    }
}

#[async_trait]
impl SubmissionLedger for PgCatalog {
    async fn list_for_attempt(
        &self,
        assignment_id: &str,
        student_id: &str,
    ) -> Result<Vec<Submission>, CatalogError> {
        Ok(submissions::list_for_student(&self.pool, assignment_id, student_id).await?)
    }

    async fn create_submission(&self, submission: &Submission) -> Result<(), CatalogError> {
        submissions::insert(&self.pool, submission)
            .await
            .map_err(|err| map_unique(err, "submission id"))
    }

    async fn find_submission(&self, id: &str) -> Result<Option<Submission>, CatalogError> {
        Ok(submissions::find_by_id(&self.pool, id).await?)
    }
}

fn map_unique(err: sqlx::Error, what: &str) -> CatalogError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            CatalogError::Conflict(what.to_string())
        }
        _ => CatalogError::Database(err),
    }
}
