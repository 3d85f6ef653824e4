use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::{format_offset, format_optional};
use crate::services::session::{ExamSession, IntegritySignal, QuestionView, SessionPhase};

#[derive(Debug, Deserialize)]
pub(crate) struct ResumeChoice {
    pub(crate) resume: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct AnswerSelect {
    #[serde(alias = "questionId")]
    #[validate(length(min = 1, message = "question_id must not be empty"))]
    pub(crate) question_id: String,
    #[serde(alias = "optionId", alias = "answerId")]
    #[validate(length(min = 1, message = "option_id must not be empty"))]
    pub(crate) option_id: String,
}

/// Signals the browser observed since its last report, oldest first.
#[derive(Debug, Deserialize, Validate)]
pub(crate) struct IntegrityReport {
    #[validate(length(min = 1, max = 100, message = "signals must hold 1-100 entries"))]
    pub(crate) signals: Vec<IntegritySignal>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AttemptResponse {
    pub(crate) assignment_id: String,
    pub(crate) exam_id: String,
    pub(crate) variant_code: String,
    pub(crate) phase: SessionPhase,
    pub(crate) started_at: String,
    pub(crate) deadline: String,
    pub(crate) remaining_seconds: i64,
    pub(crate) questions: Vec<QuestionView>,
    pub(crate) answers: BTreeMap<String, String>,
    pub(crate) pending_answer_count: usize,
    pub(crate) violations: u32,
    pub(crate) needs_review: bool,
    pub(crate) save_warning: Option<String>,
    pub(crate) last_saved_at: Option<String>,
    pub(crate) submission_id: Option<String>,
}

impl AttemptResponse {
    pub(crate) fn from_session(session: &ExamSession) -> Self {
        Self {
            assignment_id: session.assignment().id.clone(),
            exam_id: session.exam_id().to_string(),
            variant_code: session.variant_code().to_string(),
            phase: session.phase(),
            started_at: format_offset(session.started_at()),
            deadline: format_offset(session.deadline()),
            remaining_seconds: session.remaining_seconds(),
            questions: session.question_views(),
            answers: session.answers().clone(),
            pending_answer_count: session.pending_answer_count(),
            violations: session.violations(),
            needs_review: session.needs_review(),
            save_warning: session.save_warning().map(str::to_string),
            last_saved_at: format_optional(session.last_saved_at()),
            submission_id: session.submission().map(|submission| submission.id.clone()),
        }
    }
}

/// Outcome of opening an attempt: either the live attempt or a pointer to the result.
#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub(crate) enum AttemptOutcome {
    Live(AttemptResponse),
    Exhausted { submission_id: String },
    Submitted { submission_id: String, auto_submitted: bool },
}

#[derive(Debug, Serialize)]
pub(crate) struct IntegrityResponse {
    pub(crate) counted: u32,
    pub(crate) attempt: AttemptResponse,
}
