use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;
use sqlx::types::Json;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::core::clock::Clock;
use crate::core::metrics::{
    AUTOSAVE_FAILURES, INTEGRITY_VIOLATIONS, SESSIONS_STARTED, SUBMISSIONS_CREATED,
};
use crate::db::models::{Assignment, ExamVariant, Question, Submission};
use crate::db::types::CognitiveLevel;
use crate::repositories::{Catalog, CatalogError};
use crate::services::assignment_lifecycle::{self, EntryDenied};
use crate::services::grading;
use crate::services::shuffle::{stable_permutation, ShuffleSource};

use super::integrity::{IntegrityEventSource, IntegritySignal};
use super::store::{AttemptStorage, PersistenceStore, StoreError};
use super::timing;

/// Collaborators shared by every attempt.
#[derive(Clone)]
pub(crate) struct SessionContext {
    pub(crate) catalog: Arc<dyn Catalog>,
    pub(crate) store: Arc<dyn PersistenceStore>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) shuffle: Arc<dyn ShuffleSource>,
    pub(crate) key_prefix: String,
    pub(crate) review_threshold: u32,
}

#[derive(Debug, Error)]
pub(crate) enum SessionError {
    #[error("assignment not found")]
    AssignmentNotFound,
    #[error("exam not found")]
    ExamNotFound,
    #[error("{}", .0.message())]
    Unavailable(EntryDenied),
    #[error("no attempt in progress")]
    NoAttemptInProgress,
    #[error("exam variant has no questions")]
    EmptyVariant,
    #[error("question {0} is not part of this attempt")]
    UnknownQuestion(String),
    #[error("option {option_id} does not belong to question {question_id}")]
    UnknownOption { question_id: String, option_id: String },
    #[error("action not allowed while the attempt is {}", .0.as_str())]
    InvalidPhase(SessionPhase),
    #[error("submission could not be saved: {0}")]
    SubmissionFailed(CatalogError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum SessionPhase {
    ResumePrompt,
    Active,
    ViolationOverlay,
    Submitting,
    Completed,
}

impl SessionPhase {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::ResumePrompt => "resume_prompt",
            Self::Active => "active",
            Self::ViolationOverlay => "violation_overlay",
            Self::Submitting => "submitting",
            Self::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SubmitMode {
    Manual,
    Timeout,
}

impl SubmitMode {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Timeout => "timeout",
        }
    }
}

/// Result of loading an attempt.
pub(crate) enum Opened {
    Live(Box<ExamSession>),
    /// Attempt limit reached; points at the student's first submission.
    Exhausted { submission_id: String },
    /// Nothing in progress but an earlier attempt was submitted, possibly by the timer.
    Submitted { submission_id: String, auto_submitted: bool },
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct OptionView {
    pub(crate) id: String,
    pub(crate) content: String,
}

/// A question as shown to the student. Correctness is never exposed.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct QuestionView {
    pub(crate) id: String,
    pub(crate) level: CognitiveLevel,
    pub(crate) content: String,
    pub(crate) options: Vec<OptionView>,
}

/// One student's attempt at one assignment.
pub(crate) struct ExamSession {
    ctx: SessionContext,
    storage: AttemptStorage,
    assignment: Assignment,
    student_id: String,
    exam_id: String,
    variant_index: usize,
    variant: ExamVariant,
    questions: Vec<Question>,
    started_at: OffsetDateTime,
    deadline: OffsetDateTime,
    phase: SessionPhase,
    answers: BTreeMap<String, String>,
    pending_answers: Option<BTreeMap<String, String>>,
    violations: u32,
    save_warning: Option<String>,
    last_saved_at: Option<OffsetDateTime>,
    last_contact: OffsetDateTime,
    submission_id: String,
    submission: Option<Submission>,
}

impl ExamSession {
    /// Loads the attempt, pinning its start time and variant on first entry.
    pub(crate) async fn open(
        ctx: &SessionContext,
        assignment_id: &str,
        student_id: &str,
    ) -> Result<Opened, SessionError> {
        Self::load(ctx, assignment_id, student_id, true).await
    }

    /// Loads an attempt that has already started; never begins a new one.
    pub(crate) async fn resume(
        ctx: &SessionContext,
        assignment_id: &str,
        student_id: &str,
    ) -> Result<Opened, SessionError> {
        Self::load(ctx, assignment_id, student_id, false).await
    }

    async fn load(
        ctx: &SessionContext,
        assignment_id: &str,
        student_id: &str,
        allow_start: bool,
    ) -> Result<Opened, SessionError> {
        let assignment = ctx
            .catalog
            .find_assignment(assignment_id)
            .await?
            .ok_or(SessionError::AssignmentNotFound)?;
        let exam =
            ctx.catalog.find_exam(&assignment.exam_id).await?.ok_or(SessionError::ExamNotFound)?;

        let prior = ctx.catalog.list_for_attempt(assignment_id, student_id).await?;
        let limit = usize::try_from(assignment.max_attempts).unwrap_or(1).max(1);
        if prior.len() >= limit {
            if let Some(first) = prior.first() {
                tracing::info!(
                    assignment_id,
                    student_id,
                    attempts = prior.len(),
                    "attempt limit reached"
                );
                return Ok(Opened::Exhausted { submission_id: first.id.clone() });
            }
        }

        let storage =
            AttemptStorage::new(ctx.store.clone(), &ctx.key_prefix, assignment_id, student_id);
        let now = ctx.clock.now();
        let mut save_warning = None;

        // State written before the latest submission belongs to an attempt that already ended
        // and whose cleanup failed. It is never read again.
        let latest = prior.iter().max_by_key(|submission| submission.submitted_at);
        let mut stored_start = storage.start_time().await;
        let stale = matches!(
            (stored_start, latest),
            (Some(start), Some(done)) if start <= done.submitted_at
        );
        if stale {
            tracing::warn!(
                assignment_id,
                student_id,
                "discarding attempt state left over from a submitted attempt"
            );
            if let Err(err) = storage.clear_all().await {
                save_warning = Some(warn_store_failure(&err, assignment_id, student_id));
            }
            stored_start = None;
        }

        let started_at = match stored_start {
            Some(existing) => existing,
            None if !allow_start => {
                return match latest {
                    Some(done) => Ok(Opened::Submitted {
                        submission_id: done.id.clone(),
                        auto_submitted: done.auto_submitted,
                    }),
                    None => Err(SessionError::NoAttemptInProgress),
                };
            }
            None => {
                assignment_lifecycle::check_window(&assignment, now)
                    .map_err(SessionError::Unavailable)?;
                match storage.set_start_time_once(now).await {
                    // A leftover start that could not be cleared is not this attempt's.
                    Ok(started_at) if !stale => started_at,
                    Ok(_) => now,
                    Err(err) => {
                        save_warning = Some(warn_store_failure(&err, assignment_id, student_id));
                        now
                    }
                }
            }
        };

        let variant_count = exam.variants.len();
        if variant_count == 0 {
            return Err(SessionError::EmptyVariant);
        }
        let stored_variant =
            if stale { None } else { storage.variant_index(variant_count).await };
        let variant_index = if !assignment.settings.shuffle_questions {
            0
        } else if let Some(stored) = stored_variant {
            stored
        } else {
            let picked = ctx.shuffle.pick(variant_count);
            match storage.set_variant_index_once(picked, variant_count).await {
                Ok(pinned) if !stale => pinned,
                Ok(_) => picked,
                Err(err) => {
                    save_warning = Some(warn_store_failure(&err, assignment_id, student_id));
                    picked
                }
            }
        };
        let variant = exam.variants[variant_index].clone();

        let questions = load_variant_questions(ctx, &variant).await?;
        if questions.is_empty() {
            return Err(SessionError::EmptyVariant);
        }

        let (persisted_answers, violations) = if stale {
            (BTreeMap::new(), 0)
        } else {
            (storage.answers().await, storage.violations().await)
        };
        let duration_minutes = assignment.effective_duration_minutes(&exam);
        let deadline = timing::deadline(started_at, duration_minutes, assignment.end_time);

        let (phase, pending_answers) = if persisted_answers.is_empty() {
            (SessionPhase::Active, None)
        } else {
            (SessionPhase::ResumePrompt, Some(persisted_answers))
        };

        let mut session = ExamSession {
            ctx: ctx.clone(),
            storage,
            student_id: student_id.to_string(),
            exam_id: exam.id.clone(),
            variant_index,
            variant,
            questions,
            started_at,
            deadline,
            phase,
            answers: BTreeMap::new(),
            pending_answers,
            violations,
            save_warning,
            last_saved_at: None,
            last_contact: now,
            submission_id: Uuid::new_v4().to_string(),
            submission: None,
            assignment,
        };

        metrics::counter!(SESSIONS_STARTED).increment(1);
        tracing::info!(
            assignment_id,
            student_id,
            variant_code = %session.variant.code,
            phase = session.phase.as_str(),
            remaining_seconds = session.remaining_seconds(),
            "attempt session opened"
        );

        if session.remaining_seconds() == 0 {
            if let Err(err) = session.submit(SubmitMode::Timeout).await {
                tracing::warn!(
                    assignment_id,
                    student_id,
                    error = %err,
                    "forced submission on load failed; will retry"
                );
            }
        }

        Ok(Opened::Live(Box::new(session)))
    }

    pub(crate) fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub(crate) fn assignment(&self) -> &Assignment {
        &self.assignment
    }

    pub(crate) fn student_id(&self) -> &str {
        &self.student_id
    }

    pub(crate) fn exam_id(&self) -> &str {
        &self.exam_id
    }

    pub(crate) fn variant_index(&self) -> usize {
        self.variant_index
    }

    pub(crate) fn variant_code(&self) -> &str {
        &self.variant.code
    }

    pub(crate) fn started_at(&self) -> OffsetDateTime {
        self.started_at
    }

    pub(crate) fn deadline(&self) -> OffsetDateTime {
        self.deadline
    }

    pub(crate) fn answers(&self) -> &BTreeMap<String, String> {
        &self.answers
    }

    /// Answers found in storage that the student has not yet chosen to resume or discard.
    pub(crate) fn pending_answer_count(&self) -> usize {
        self.pending_answers.as_ref().map_or(0, BTreeMap::len)
    }

    pub(crate) fn violations(&self) -> u32 {
        self.violations
    }

    pub(crate) fn needs_review(&self) -> bool {
        self.violations > self.ctx.review_threshold
    }

    pub(crate) fn save_warning(&self) -> Option<&str> {
        self.save_warning.as_deref()
    }

    pub(crate) fn last_saved_at(&self) -> Option<OffsetDateTime> {
        self.last_saved_at
    }

    pub(crate) fn last_contact(&self) -> OffsetDateTime {
        self.last_contact
    }

    pub(crate) fn submission(&self) -> Option<&Submission> {
        self.submission.as_ref()
    }

    pub(crate) fn remaining_seconds(&self) -> i64 {
        timing::remaining_seconds(self.deadline, self.ctx.clock.now())
    }

    /// Marks client activity; idle sessions are evicted from memory.
    pub(crate) fn touch(&mut self) {
        self.last_contact = self.ctx.clock.now();
    }

    /// Questions in variant order. Options are permuted per student when the assignment
    /// shuffles answers, and the permutation is stable across reloads.
    pub(crate) fn question_views(&self) -> Vec<QuestionView> {
        let shuffle_answers = self.assignment.settings.shuffle_answers;
        self.questions
            .iter()
            .map(|question| {
                let mut options: Vec<OptionView> = question
                    .options
                    .iter()
                    .map(|option| OptionView {
                        id: option.id.clone(),
                        content: option.content.clone(),
                    })
                    .collect();

                if shuffle_answers {
                    let material =
                        format!("{}:{}:{}", self.assignment.id, self.student_id, question.id);
                    let order = stable_permutation(&material, options.len());
                    options = order.into_iter().map(|index| options[index].clone()).collect();
                }

                QuestionView {
                    id: question.id.clone(),
                    level: question.level,
                    content: question.content.clone(),
                    options,
                }
            })
            .collect()
    }

    /// Answers the resume prompt. Resuming adopts the stored answers; restarting discards only
    /// the answers while the clock, variant and violation count stay.
    pub(crate) async fn choose_resume(&mut self, resume: bool) -> Result<(), SessionError> {
        self.touch();
        if self.phase != SessionPhase::ResumePrompt {
            return Err(SessionError::InvalidPhase(self.phase));
        }

        let pending = self.pending_answers.take().unwrap_or_default();
        if resume {
            self.answers = pending;
        } else {
            self.answers.clear();
            let result = self.storage.clear_answers().await;
            self.record_write(result);
        }

        self.phase = SessionPhase::Active;
        tracing::info!(
            assignment_id = %self.assignment.id,
            student_id = %self.student_id,
            resume,
            "resume prompt answered"
        );
        Ok(())
    }

    pub(crate) async fn select_answer(
        &mut self,
        question_id: &str,
        option_id: &str,
    ) -> Result<(), SessionError> {
        self.touch();
        if self.phase != SessionPhase::Active {
            return Err(SessionError::InvalidPhase(self.phase));
        }

        let question = self
            .questions
            .iter()
            .find(|question| question.id == question_id)
            .ok_or_else(|| SessionError::UnknownQuestion(question_id.to_string()))?;
        if !question.has_option(option_id) {
            return Err(SessionError::UnknownOption {
                question_id: question_id.to_string(),
                option_id: option_id.to_string(),
            });
        }

        self.answers.insert(question_id.to_string(), option_id.to_string());
        let result = self.storage.set_answers(&self.answers).await;
        self.record_write(result);
        Ok(())
    }

    /// Counts one violation if the attempt is active. Returns whether the signal counted.
    pub(crate) async fn record_integrity_signal(&mut self, signal: IntegritySignal) -> bool {
        if self.phase != SessionPhase::Active {
            tracing::debug!(
                assignment_id = %self.assignment.id,
                student_id = %self.student_id,
                signal = signal.as_str(),
                phase = self.phase.as_str(),
                "integrity signal ignored"
            );
            return false;
        }

        self.violations += 1;
        self.phase = SessionPhase::ViolationOverlay;
        metrics::counter!(INTEGRITY_VIOLATIONS, "signal" => signal.as_str()).increment(1);
        tracing::warn!(
            assignment_id = %self.assignment.id,
            student_id = %self.student_id,
            signal = signal.as_str(),
            violations = self.violations,
            "integrity violation recorded"
        );

        let result = self.storage.set_violations(self.violations).await;
        self.record_write(result);
        true
    }

    /// Drains `source`, applying every signal in order. Returns how many counted.
    pub(crate) async fn apply_signals(&mut self, source: &mut dyn IntegrityEventSource) -> u32 {
        self.touch();
        let mut counted = 0;
        while let Some(signal) = source.next_signal().await {
            if self.record_integrity_signal(signal).await {
                counted += 1;
            }
        }
        counted
    }

    pub(crate) fn acknowledge_violation(&mut self) -> Result<(), SessionError> {
        self.touch();
        if self.phase != SessionPhase::ViolationOverlay {
            return Err(SessionError::InvalidPhase(self.phase));
        }
        self.phase = SessionPhase::Active;
        Ok(())
    }

    /// Timer step. Submits automatically once the deadline has passed; returns whether this
    /// tick produced the submission.
    pub(crate) async fn tick(&mut self) -> Result<bool, SessionError> {
        if self.phase == SessionPhase::Completed || self.remaining_seconds() > 0 {
            return Ok(false);
        }
        self.submit(SubmitMode::Timeout).await.map(|_| true)
    }

    /// Grades and appends the submission, then clears the stored attempt state.
    ///
    /// A failed append leaves the attempt in `Submitting` with its state intact so the call can
    /// be retried. Repeating a successful submit returns the same submission.
    pub(crate) async fn submit(&mut self, mode: SubmitMode) -> Result<Submission, SessionError> {
        if let Some(done) = &self.submission {
            return Ok(done.clone());
        }

        match (self.phase, mode) {
            (SessionPhase::Active | SessionPhase::Submitting, _) => {}
            (SessionPhase::ResumePrompt | SessionPhase::ViolationOverlay, SubmitMode::Timeout) => {}
            (phase, _) => return Err(SessionError::InvalidPhase(phase)),
        }

        if let Some(pending) = self.pending_answers.take() {
            self.answers = pending;
        }
        self.phase = SessionPhase::Submitting;

        let now = self.ctx.clock.now();
        let report = grading::grade(&self.questions, &self.answers);
        let submission = Submission {
            id: self.submission_id.clone(),
            assignment_id: self.assignment.id.clone(),
            student_id: self.student_id.clone(),
            exam_id: self.exam_id.clone(),
            variant_code: self.variant.code.clone(),
            started_at: self.started_at,
            submitted_at: now,
            answers: Json(report.answers),
            score: report.score,
            passed: report.passed,
            correct_count: report.correct as i32,
            total_questions: report.total as i32,
            violation_count: self.violations as i32,
            flagged_for_review: self.needs_review(),
            auto_submitted: mode == SubmitMode::Timeout,
        };

        match self.ctx.catalog.create_submission(&submission).await {
            Ok(()) => {}
            // A previous try landed even though its response was lost.
            Err(CatalogError::Conflict(_)) => {}
            Err(err) => {
                tracing::error!(
                    assignment_id = %self.assignment.id,
                    student_id = %self.student_id,
                    error = %err,
                    "failed to append submission"
                );
                return Err(SessionError::SubmissionFailed(err));
            }
        }

        if let Err(err) = self.storage.clear_all().await {
            tracing::warn!(
                assignment_id = %self.assignment.id,
                student_id = %self.student_id,
                error = %err,
                "failed to clear attempt state after submission"
            );
        }
        if let Err(err) = self.ctx.catalog.record_question_usage(&report.usage).await {
            tracing::warn!(
                submission_id = %submission.id,
                error = %err,
                "failed to update question usage statistics"
            );
        }

        metrics::counter!(SUBMISSIONS_CREATED, "mode" => mode.as_str()).increment(1);
        tracing::info!(
            submission_id = %submission.id,
            assignment_id = %submission.assignment_id,
            student_id = %submission.student_id,
            score = submission.score,
            violations = submission.violation_count,
            auto_submitted = submission.auto_submitted,
            "attempt submitted"
        );

        self.phase = SessionPhase::Completed;
        self.submission = Some(submission.clone());
        Ok(submission)
    }

    fn record_write(&mut self, result: Result<(), StoreError>) {
        match result {
            Ok(()) => {
                self.last_saved_at = Some(self.ctx.clock.now());
                self.save_warning = None;
            }
            Err(err) => {
                self.save_warning =
                    Some(warn_store_failure(&err, &self.assignment.id, &self.student_id));
            }
        }
    }
}

async fn load_variant_questions(
    ctx: &SessionContext,
    variant: &ExamVariant,
) -> Result<Vec<Question>, SessionError> {
    let found = ctx.catalog.find_questions(&variant.question_ids).await?;
    let mut by_id: HashMap<String, Question> =
        found.into_iter().map(|question| (question.id.clone(), question)).collect();

    let mut ordered = Vec::with_capacity(variant.question_ids.len());
    for id in &variant.question_ids {
        match by_id.remove(id) {
            Some(question) => ordered.push(question),
            None => tracing::warn!(
                question_id = %id,
                variant_code = %variant.code,
                "question missing from catalog; skipped"
            ),
        }
    }
    Ok(ordered)
}

fn warn_store_failure(err: &StoreError, assignment_id: &str, student_id: &str) -> String {
    metrics::counter!(AUTOSAVE_FAILURES).increment(1);
    tracing::warn!(assignment_id, student_id, error = %err, "attempt state write failed");
    "Progress could not be saved; keep the page open and your answers will be retried".to_string()
}
