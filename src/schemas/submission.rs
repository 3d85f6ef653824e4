use serde::Serialize;

use crate::core::time::format_offset;
use crate::db::models::{Submission, SubmissionAnswer};

/// Graded part of a submission; withheld from students unless the assignment shows results.
#[derive(Debug, Serialize)]
pub(crate) struct SubmissionResult {
    pub(crate) score: f64,
    pub(crate) passed: bool,
    pub(crate) correct_count: i32,
    pub(crate) total_questions: i32,
    pub(crate) answers: Vec<SubmissionAnswer>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SubmissionResponse {
    pub(crate) id: String,
    pub(crate) assignment_id: String,
    pub(crate) student_id: String,
    pub(crate) exam_id: String,
    pub(crate) variant_code: String,
    pub(crate) started_at: String,
    pub(crate) submitted_at: String,
    pub(crate) violation_count: i32,
    pub(crate) flagged_for_review: bool,
    pub(crate) auto_submitted: bool,
    pub(crate) result: Option<SubmissionResult>,
}

impl SubmissionResponse {
    pub(crate) fn from_submission(submission: Submission, show_result: bool) -> Self {
        let result = show_result.then(|| SubmissionResult {
            score: submission.score,
            passed: submission.passed,
            correct_count: submission.correct_count,
            total_questions: submission.total_questions,
            answers: submission.answers.0.clone(),
        });

        Self {
            id: submission.id,
            assignment_id: submission.assignment_id,
            student_id: submission.student_id,
            exam_id: submission.exam_id,
            variant_code: submission.variant_code,
            started_at: format_offset(submission.started_at),
            submitted_at: format_offset(submission.submitted_at),
            violation_count: submission.violation_count,
            flagged_for_review: submission.flagged_for_review,
            auto_submitted: submission.auto_submitted,
            result,
        }
    }
}
