use serde::{Deserialize, Serialize};
use sqlx::Type;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Type,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "cognitivelevel", rename_all = "snake_case")]
pub(crate) enum CognitiveLevel {
    #[serde(alias = "RECOGNITION")]
    Recognition,
    #[serde(alias = "UNDERSTANDING")]
    Understanding,
    #[serde(alias = "APPLICATION")]
    Application,
    #[serde(alias = "HIGH_APPLICATION")]
    HighApplication,
}

impl CognitiveLevel {
    /// Levels in the order their questions are concatenated into an exam.
    pub(crate) const ALL: [CognitiveLevel; 4] =
        [Self::Recognition, Self::Understanding, Self::Application, Self::HighApplication];

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Recognition => "recognition",
            Self::Understanding => "understanding",
            Self::Application => "application",
            Self::HighApplication => "high_application",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "assignmentstatus", rename_all = "lowercase")]
pub(crate) enum AssignmentStatus {
    #[serde(alias = "DRAFT")]
    Draft,
    #[serde(alias = "OPEN")]
    Open,
    #[serde(alias = "CLOSED")]
    Closed,
}

impl AssignmentStatus {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}
