//! Storage seams for the exam core. Postgres backs them in production; tests use in-memory
//! implementations.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

use crate::db::models::{Assignment, Exam, Question, Submission};
use crate::db::types::{AssignmentStatus, CognitiveLevel};

#[derive(Debug, Error)]
pub(crate) enum CatalogError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("duplicate record: {0}")]
    Conflict(String),
    #[error("catalog unavailable: {0}")]
    Unavailable(String),
}

/// One question's outcome in a finished attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct QuestionUsage {
    pub(crate) question_id: String,
    pub(crate) correct: bool,
}

/// Read-only view over the question bank.
#[async_trait]
pub(crate) trait QuestionPool: Send + Sync {
    /// Number of questions of `level` that belong to any of `lesson_ids`.
    async fn count_available(
        &self,
        lesson_ids: &[String],
        level: CognitiveLevel,
    ) -> Result<u64, CatalogError>;

    /// Ids of those questions, in storage order.
    async fn list_available(
        &self,
        lesson_ids: &[String],
        level: CognitiveLevel,
    ) -> Result<Vec<String>, CatalogError>;
}

/// Exams, assignments and question records.
#[async_trait]
pub(crate) trait ExamCatalog: Send + Sync {
    async fn find_exam(&self, id: &str) -> Result<Option<Exam>, CatalogError>;

    async fn insert_exam(&self, exam: &Exam) -> Result<(), CatalogError>;

    /// Questions for the given ids. Unknown ids are skipped; order is not guaranteed.
    async fn find_questions(&self, ids: &[String]) -> Result<Vec<Question>, CatalogError>;

    /// Bumps `used_count` for every entry and `correct_count` for the correct ones.
    async fn record_question_usage(&self, usage: &[QuestionUsage]) -> Result<(), CatalogError>;

    async fn find_assignment(&self, id: &str) -> Result<Option<Assignment>, CatalogError>;

    async fn find_assignment_by_code(&self, code: &str)
        -> Result<Option<Assignment>, CatalogError>;

    async fn access_code_exists(&self, code: &str) -> Result<bool, CatalogError>;

    /// Fails with `CatalogError::Conflict` when the access code is taken.
    async fn insert_assignment(&self, assignment: &Assignment) -> Result<(), CatalogError>;

    async fn update_assignment_status(
        &self,
        id: &str,
        status: AssignmentStatus,
        now: OffsetDateTime,
    ) -> Result<Option<Assignment>, CatalogError>;

    /// Closes every open assignment whose window ended before `now`. Returns how many closed.
    async fn close_expired_assignments(&self, now: OffsetDateTime) -> Result<u64, CatalogError>;

    async fn ping(&self) -> Result<(), CatalogError>;
}

/// Append-only record of finished attempts.
#[async_trait]
pub(crate) trait SubmissionLedger: Send + Sync {
    /// Submissions of one student for one assignment, oldest first.
    async fn list_for_attempt(
        &self,
        assignment_id: &str,
        student_id: &str,
    ) -> Result<Vec<Submission>, CatalogError>;

    async fn create_submission(&self, submission: &Submission) -> Result<(), CatalogError>;

    async fn find_submission(&self, id: &str) -> Result<Option<Submission>, CatalogError>;
}

/// Everything the service needs from persistent storage.
pub(crate) trait Catalog: QuestionPool + ExamCatalog + SubmissionLedger {}

impl<T> Catalog for T where T: QuestionPool + ExamCatalog + SubmissionLedger {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_traits_are_object_safe() {
        fn _pool(_: Box<dyn QuestionPool>) {}
        fn _catalog(_: Box<dyn ExamCatalog>) {}
        fn _ledger(_: Box<dyn SubmissionLedger>) {}
        fn _all(_: std::sync::Arc<dyn Catalog>) {}
    }
}
