use std::collections::BTreeMap;

use crate::db::models::{Question, SubmissionAnswer};
use crate::repositories::QuestionUsage;

pub(crate) const MAX_SCORE: f64 = 10.0;
pub(crate) const PASS_SCORE: f64 = 5.0;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GradeReport {
    pub(crate) answers: Vec<SubmissionAnswer>,
    pub(crate) usage: Vec<QuestionUsage>,
    pub(crate) correct: u32,
    pub(crate) total: u32,
    pub(crate) score: f64,
    pub(crate) passed: bool,
}

/// Scores an attempt. `questions` is the variant's question list in display order; answers for
/// questions outside it are ignored.
pub(crate) fn grade(questions: &[Question], answers: &BTreeMap<String, String>) -> GradeReport {
    let mut report_answers = Vec::with_capacity(questions.len());
    let mut usage = Vec::with_capacity(questions.len());
    let mut correct = 0u32;

    for question in questions {
        let chosen = answers.get(&question.id).cloned();
        let is_correct = match (chosen.as_deref(), question.correct_option_id()) {
            (Some(chosen), Some(expected)) => chosen == expected,
            _ => false,
        };
        if is_correct {
            correct += 1;
        }

        usage.push(QuestionUsage { question_id: question.id.clone(), correct: is_correct });
        report_answers.push(SubmissionAnswer { question_id: question.id.clone(), answer_id: chosen });
    }

    let total = questions.len() as u32;
    let score = score_for(correct, total);

    GradeReport { answers: report_answers, usage, correct, total, score, passed: score >= PASS_SCORE }
}

/// `correct / total` on a ten point scale, rounded to two decimals. An empty exam scores zero.
pub(crate) fn score_for(correct: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let raw = f64::from(correct) / f64::from(total) * MAX_SCORE;
    (raw * 100.0).round() / 100.0
}
