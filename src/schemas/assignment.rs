use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;
use validator::Validate;

use crate::core::time::{format_offset, parse_offset_flexible};
use crate::db::models::{Assignment, AssignmentSettings};
use crate::db::types::AssignmentStatus;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct AssignmentCreate {
    #[serde(alias = "examId")]
    #[validate(length(min = 1, message = "exam_id must not be empty"))]
    pub(crate) exam_id: String,
    #[serde(alias = "classId")]
    #[validate(length(min = 1, message = "class_id must not be empty"))]
    pub(crate) class_id: String,
    #[serde(alias = "startTime", deserialize_with = "deserialize_offset_datetime_flexible")]
    pub(crate) start_time: OffsetDateTime,
    #[serde(alias = "endTime", deserialize_with = "deserialize_offset_datetime_flexible")]
    pub(crate) end_time: OffsetDateTime,
    #[serde(default, alias = "durationMinutes")]
    #[validate(range(min = 1, message = "duration_minutes must be positive"))]
    pub(crate) duration_minutes: Option<i32>,
    #[serde(default = "default_max_attempts", alias = "maxAttempts")]
    #[validate(range(min = 1, message = "max_attempts must be positive"))]
    pub(crate) max_attempts: i32,
    #[serde(default)]
    pub(crate) settings: AssignmentSettings,
    #[serde(default)]
    pub(crate) publish: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct AssignmentResponse {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) class_id: String,
    pub(crate) code: String,
    pub(crate) status: AssignmentStatus,
    /// Status with an elapsed window already counted as closed.
    pub(crate) effective_status: AssignmentStatus,
    pub(crate) start_time: String,
    pub(crate) end_time: String,
    pub(crate) duration_minutes: Option<i32>,
    pub(crate) max_attempts: i32,
    pub(crate) settings: AssignmentSettings,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
}

impl AssignmentResponse {
    pub(crate) fn from_assignment(assignment: Assignment, effective_status: AssignmentStatus) -> Self {
        Self {
            id: assignment.id,
            exam_id: assignment.exam_id,
            class_id: assignment.class_id,
            code: assignment.code,
            status: assignment.status,
            effective_status,
            start_time: format_offset(assignment.start_time),
            end_time: format_offset(assignment.end_time),
            duration_minutes: assignment.duration_minutes,
            max_attempts: assignment.max_attempts,
            settings: assignment.settings.0,
            created_at: format_offset(assignment.created_at),
            updated_at: format_offset(assignment.updated_at),
        }
    }
}

/// What a student sees after typing an access code.
#[derive(Debug, Serialize)]
pub(crate) struct AssignmentEntryResponse {
    pub(crate) assignment_id: String,
    pub(crate) exam_title: String,
    pub(crate) status: AssignmentStatus,
    pub(crate) start_time: String,
    pub(crate) end_time: String,
    pub(crate) duration_minutes: i32,
    pub(crate) total_questions: i32,
    pub(crate) max_attempts: i32,
    pub(crate) attempts_used: usize,
    pub(crate) can_start: bool,
    pub(crate) reason: Option<String>,
}

fn default_max_attempts() -> i32 {
    1
}

fn deserialize_offset_datetime_flexible<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_offset_flexible(&raw)
        .ok_or_else(|| D::Error::custom(format!("invalid datetime: {raw}")))
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn accepts_datetime_local_and_defaults() {
        let payload: AssignmentCreate = serde_json::from_value(serde_json::json!({
            "examId": "exam-1",
            "classId": "10A",
            "startTime": "2025-04-01T09:00",
            "endTime": "2025-04-01T11:00:00+02:00",
        }))
        .expect("payload");

        assert_eq!(payload.start_time, datetime!(2025-04-01 09:00 UTC));
        assert_eq!(payload.end_time, datetime!(2025-04-01 09:00 UTC));
        assert_eq!(payload.max_attempts, 1);
        assert!(payload.settings.shuffle_questions);
        assert!(!payload.settings.show_result);
        assert!(!payload.publish);
    }

    #[test]
    fn rejects_garbage_datetime() {
        let result = serde_json::from_value::<AssignmentCreate>(serde_json::json!({
            "exam_id": "exam-1",
            "class_id": "10A",
            "start_time": "tomorrow",
            "end_time": "2025-04-01T11:00",
        }));
        assert!(result.is_err());
    }

    #[test]
    fn zero_attempts_fail_validation() {
        let payload: AssignmentCreate = serde_json::from_value(serde_json::json!({
            "exam_id": "exam-1",
            "class_id": "10A",
            "start_time": "2025-04-01T09:00",
            "end_time": "2025-04-01T11:00",
            "max_attempts": 0,
        }))
        .expect("payload");
        assert!(payload.validate().is_err());
    }
}
