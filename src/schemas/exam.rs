use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_offset;
use crate::db::models::{Exam, ExamVariant, LevelCounts};
use crate::db::types::CognitiveLevel;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ExamGenerate {
    #[validate(length(min = 1, max = 200, message = "title must be 1-200 characters"))]
    pub(crate) title: String,
    #[serde(alias = "durationMinutes")]
    #[validate(range(min = 1, max = 600, message = "duration_minutes must be 1-600"))]
    pub(crate) duration_minutes: i32,
    #[serde(alias = "lessonIds")]
    #[validate(length(min = 1, message = "at least one lesson is required"))]
    pub(crate) lesson_ids: Vec<String>,
    #[serde(alias = "levelCounts")]
    pub(crate) level_counts: LevelCounts,
    #[serde(default = "default_variant_count", alias = "variantCount")]
    #[validate(range(min = 1, message = "variant_count must be positive"))]
    pub(crate) variant_count: u32,
    /// Reproduces a previous draw when given.
    #[serde(default)]
    pub(crate) seed: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AvailabilityQuery {
    /// Comma-separated lesson ids.
    #[serde(default, alias = "lessonIds")]
    pub(crate) lesson_ids: String,
}

impl AvailabilityQuery {
    pub(crate) fn lesson_ids(&self) -> Vec<String> {
        self.lesson_ids
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AvailabilityResponse {
    pub(crate) lesson_ids: Vec<String>,
    pub(crate) levels: BTreeMap<CognitiveLevel, u64>,
    pub(crate) total: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExamResponse {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) duration_minutes: i32,
    pub(crate) total_questions: i32,
    pub(crate) lesson_ids: Vec<String>,
    pub(crate) level_counts: LevelCounts,
    pub(crate) variants: Vec<ExamVariant>,
    pub(crate) generation_seed: Option<i64>,
    pub(crate) created_at: String,
}

impl From<Exam> for ExamResponse {
    fn from(exam: Exam) -> Self {
        Self {
            id: exam.id,
            title: exam.title,
            duration_minutes: exam.duration_minutes,
            total_questions: exam.total_questions,
            lesson_ids: exam.lesson_ids.0,
            level_counts: exam.level_counts.0,
            variants: exam.variants.0,
            generation_seed: exam.generation_seed,
            created_at: format_offset(exam.created_at),
        }
    }
}

fn default_variant_count() -> u32 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camel_case_aliases_are_accepted() {
        let payload: ExamGenerate = serde_json::from_value(serde_json::json!({
            "title": "Quiz",
            "durationMinutes": 30,
            "lessonIds": ["l1"],
            "levelCounts": { "recognition": 2 },
        }))
        .expect("payload");

        assert_eq!(payload.variant_count, 1);
        assert_eq!(payload.level_counts.recognition, 2);
        assert_eq!(payload.level_counts.high_application, 0);
        assert!(payload.validate().is_ok());
    }

    #[test]
    fn availability_query_splits_lessons() {
        let query = AvailabilityQuery { lesson_ids: " l1, ,l2 ".to_string() };
        assert_eq!(query.lesson_ids(), vec!["l1".to_string(), "l2".to_string()]);
    }
}
