use std::collections::{BTreeMap, HashSet};

use sqlx::types::Json;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::core::config::Settings;
use crate::core::metrics::BLUEPRINTS_GENERATED;
use crate::db::models::{Exam, ExamVariant, LevelCounts};
use crate::db::types::CognitiveLevel;
use crate::repositories::{CatalogError, QuestionPool};
use crate::services::shuffle::ShuffleSource;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub(crate) struct LevelShortfall {
    pub(crate) level: CognitiveLevel,
    pub(crate) requested: u32,
    pub(crate) available: u64,
}

#[derive(Debug, Error)]
pub(crate) enum BlueprintError {
    #[error("question pool is too small: {}", describe_shortfalls(.0))]
    InsufficientPool(Vec<LevelShortfall>),
    #[error("invalid selection matrix: {0}")]
    InvalidMatrix(String),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// How many questions of each level to draw, from which lessons, and how many variants to emit.
#[derive(Debug, Clone)]
pub(crate) struct SelectionMatrix {
    pub(crate) lesson_ids: Vec<String>,
    pub(crate) counts: LevelCounts,
    pub(crate) variant_count: u32,
}

#[derive(Debug, Clone)]
pub(crate) struct ExamDraft {
    pub(crate) title: String,
    pub(crate) duration_minutes: i32,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct BlueprintOptions {
    pub(crate) variant_code_base: u32,
    pub(crate) max_variants: u32,
}

impl BlueprintOptions {
    pub(crate) fn from_settings(settings: &Settings) -> Self {
        let blueprint = settings.blueprint();
        Self {
            variant_code_base: blueprint.variant_code_base,
            max_variants: blueprint.max_variants,
        }
    }
}

/// Per-level question counts for the given lessons.
pub(crate) async fn availability<P>(
    pool: &P,
    lesson_ids: &[String],
) -> Result<BTreeMap<CognitiveLevel, u64>, CatalogError>
where
    P: QuestionPool + ?Sized,
{
    let lesson_ids = normalize_lesson_ids(lesson_ids);
    let mut counts = BTreeMap::new();
    for level in CognitiveLevel::ALL {
        let available = if lesson_ids.is_empty() {
            0
        } else {
            pool.count_available(&lesson_ids, level).await?
        };
        counts.insert(level, available);
    }
    Ok(counts)
}

/// Draws one base question set and emits `variant_count` independent permutations of it.
///
/// Every level is checked against the pool before anything is drawn; a matrix asking for more
/// than the pool holds is rejected, never clamped.
pub(crate) async fn generate<P>(
    pool: &P,
    shuffle: &dyn ShuffleSource,
    draft: ExamDraft,
    matrix: &SelectionMatrix,
    options: BlueprintOptions,
    now: OffsetDateTime,
) -> Result<Exam, BlueprintError>
where
    P: QuestionPool + ?Sized,
{
    let lesson_ids = validate_matrix(&draft, matrix, options)?;

    let mut shortfalls = Vec::new();
    for level in CognitiveLevel::ALL {
        let requested = matrix.counts.get(level);
        if requested == 0 {
            continue;
        }
        let available = pool.count_available(&lesson_ids, level).await?;
        if u64::from(requested) > available {
            shortfalls.push(LevelShortfall { level, requested, available });
        }
    }
    if !shortfalls.is_empty() {
        return Err(BlueprintError::InsufficientPool(shortfalls));
    }

    let mut base = Vec::with_capacity(matrix.counts.total() as usize);
    for level in CognitiveLevel::ALL {
        let requested = matrix.counts.get(level);
        if requested == 0 {
            continue;
        }

        let mut eligible = pool.list_available(&lesson_ids, level).await?;
        // The pool can shrink between the count and the listing.
        if eligible.len() < requested as usize {
            return Err(BlueprintError::InsufficientPool(vec![LevelShortfall {
                level,
                requested,
                available: eligible.len() as u64,
            }]));
        }

        shuffle.shuffle(&mut eligible);
        eligible.truncate(requested as usize);
        base.extend(eligible);
    }

    let variants: Vec<ExamVariant> = (0..matrix.variant_count)
        .map(|offset| {
            let mut question_ids = base.clone();
            shuffle.shuffle(&mut question_ids);
            ExamVariant {
                code: (options.variant_code_base + offset).to_string(),
                question_ids,
            }
        })
        .collect();

    let exam = Exam {
        id: Uuid::new_v4().to_string(),
        title: draft.title.trim().to_string(),
        duration_minutes: draft.duration_minutes,
        total_questions: base.len() as i32,
        lesson_ids: Json(lesson_ids),
        level_counts: Json(matrix.counts),
        variants: Json(variants),
        generation_seed: shuffle.seed().map(|seed| seed as i64),
        created_at: now,
    };

    metrics::counter!(BLUEPRINTS_GENERATED).increment(1);
    tracing::info!(
        exam_id = %exam.id,
        total_questions = exam.total_questions,
        variants = exam.variants.len(),
        "exam blueprint generated"
    );

    Ok(exam)
}

fn validate_matrix(
    draft: &ExamDraft,
    matrix: &SelectionMatrix,
    options: BlueprintOptions,
) -> Result<Vec<String>, BlueprintError> {
    if draft.title.trim().is_empty() {
        return Err(BlueprintError::InvalidMatrix("title must not be empty".to_string()));
    }
    if draft.duration_minutes <= 0 {
        return Err(BlueprintError::InvalidMatrix("duration must be positive".to_string()));
    }

    let lesson_ids = normalize_lesson_ids(&matrix.lesson_ids);
    if lesson_ids.is_empty() {
        return Err(BlueprintError::InvalidMatrix("at least one lesson is required".to_string()));
    }
    if matrix.counts.total() == 0 {
        return Err(BlueprintError::InvalidMatrix(
            "at least one question must be requested".to_string(),
        ));
    }
    if matrix.variant_count == 0 || matrix.variant_count > options.max_variants {
        return Err(BlueprintError::InvalidMatrix(format!(
            "variant count must be between 1 and {}",
            options.max_variants
        )));
    }

    Ok(lesson_ids)
}

fn normalize_lesson_ids(raw: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .filter(|id| seen.insert(id.to_string()))
        .map(str::to_string)
        .collect()
}

fn describe_shortfalls(shortfalls: &[LevelShortfall]) -> String {
    shortfalls
        .iter()
        .map(|item| {
            format!("{} requested {} of {}", item.level.as_str(), item.requested, item.available)
        })
        .collect::<Vec<_>>()
        .join("; ")
}
