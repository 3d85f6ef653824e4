use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::OffsetDateTime;

use crate::db::types::{AssignmentStatus, CognitiveLevel};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct AnswerOption {
    pub(crate) id: String,
    pub(crate) content: String,
    #[serde(default)]
    pub(crate) is_correct: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Question {
    pub(crate) id: String,
    pub(crate) lesson_id: String,
    pub(crate) level: CognitiveLevel,
    pub(crate) content: String,
    pub(crate) options: Json<Vec<AnswerOption>>,
    pub(crate) used_count: i32,
    pub(crate) correct_count: i32,
}

impl Question {
    /// The first option flagged correct. Questions without one can never be answered correctly.
    pub(crate) fn correct_option_id(&self) -> Option<&str> {
        self.options.iter().find(|option| option.is_correct).map(|option| option.id.as_str())
    }

    pub(crate) fn has_option(&self, option_id: &str) -> bool {
        self.options.iter().any(|option| option.id == option_id)
    }
}

/// Requested question count per cognitive level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct LevelCounts {
    #[serde(default)]
    pub(crate) recognition: u32,
    #[serde(default)]
    pub(crate) understanding: u32,
    #[serde(default)]
    pub(crate) application: u32,
    #[serde(default)]
    pub(crate) high_application: u32,
}

impl LevelCounts {
    pub(crate) fn get(&self, level: CognitiveLevel) -> u32 {
        match level {
            CognitiveLevel::Recognition => self.recognition,
            CognitiveLevel::Understanding => self.understanding,
            CognitiveLevel::Application => self.application,
            CognitiveLevel::HighApplication => self.high_application,
        }
    }

    pub(crate) fn set(&mut self, level: CognitiveLevel, value: u32) {
        match level {
            CognitiveLevel::Recognition => self.recognition = value,
            CognitiveLevel::Understanding => self.understanding = value,
            CognitiveLevel::Application => self.application = value,
            CognitiveLevel::HighApplication => self.high_application = value,
        }
    }

    pub(crate) fn total(&self) -> u32 {
        CognitiveLevel::ALL.iter().map(|level| self.get(*level)).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ExamVariant {
    pub(crate) code: String,
    pub(crate) question_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Exam {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) duration_minutes: i32,
    pub(crate) total_questions: i32,
    pub(crate) lesson_ids: Json<Vec<String>>,
    pub(crate) level_counts: Json<LevelCounts>,
    pub(crate) variants: Json<Vec<ExamVariant>>,
    pub(crate) generation_seed: Option<i64>,
    pub(crate) created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct AssignmentSettings {
    #[serde(default = "default_true")]
    pub(crate) shuffle_questions: bool,
    #[serde(default = "default_true")]
    pub(crate) shuffle_answers: bool,
    #[serde(default)]
    pub(crate) show_result: bool,
}

impl Default for AssignmentSettings {
    fn default() -> Self {
        Self { shuffle_questions: true, shuffle_answers: true, show_result: false }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Assignment {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) class_id: String,
    pub(crate) code: String,
    pub(crate) status: AssignmentStatus,
    pub(crate) start_time: OffsetDateTime,
    pub(crate) end_time: OffsetDateTime,
    pub(crate) duration_minutes: Option<i32>,
    pub(crate) max_attempts: i32,
    pub(crate) settings: Json<AssignmentSettings>,
    pub(crate) created_at: OffsetDateTime,
    pub(crate) updated_at: OffsetDateTime,
}

impl Assignment {
    /// The override when present, otherwise the exam's own duration.
    pub(crate) fn effective_duration_minutes(&self, exam: &Exam) -> i32 {
        self.duration_minutes.unwrap_or(exam.duration_minutes)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct SubmissionAnswer {
    pub(crate) question_id: String,
    pub(crate) answer_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Submission {
    pub(crate) id: String,
    pub(crate) assignment_id: String,
    pub(crate) student_id: String,
    pub(crate) exam_id: String,
    pub(crate) variant_code: String,
    pub(crate) started_at: OffsetDateTime,
    pub(crate) submitted_at: OffsetDateTime,
    pub(crate) answers: Json<Vec<SubmissionAnswer>>,
    pub(crate) score: f64,
    pub(crate) passed: bool,
    pub(crate) correct_count: i32,
    pub(crate) total_questions: i32,
    pub(crate) violation_count: i32,
    pub(crate) flagged_for_review: bool,
    pub(crate) auto_submitted: bool,
}

fn default_true() -> bool {
    true
}
