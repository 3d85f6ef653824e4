use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, OnceLock, PoisonError};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request},
    Router,
};
use sqlx::types::Json;
use time::macros::datetime;
use time::{Duration, OffsetDateTime};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::api;
use crate::core::clock::Clock;
use crate::core::security::{self, Role};
use crate::core::{
    config::Settings,
    redis::RedisHandle,
    state::{AppState, Backends},
};
use crate::db::models::{AnswerOption, Assignment, Exam, ExamVariant, LevelCounts, Question, Submission};
use crate::db::types::{AssignmentStatus, CognitiveLevel};
use crate::repositories::{
    CatalogError, ExamCatalog, QuestionPool, QuestionUsage, SubmissionLedger,
};
use crate::services::session::{MemoryStore, PersistenceStore, StoreError};
use crate::services::shuffle::ShuffleSource;

const TEST_SECRET_KEY: &str = "test-secret";

/// Fixed instant test clocks start from.
pub(crate) const T0: OffsetDateTime = datetime!(2025-04-01 09:00 UTC);

pub(crate) struct TestContext {
    pub(crate) state: AppState,
    pub(crate) app: Router,
    pub(crate) catalog: Arc<MemoryCatalog>,
    pub(crate) clock: Arc<ManualClock>,
    _guard: OwnedMutexGuard<()>,
}

pub(crate) async fn env_lock() -> OwnedMutexGuard<()> {
    static LOCK: OnceLock<Arc<Mutex<()>>> = OnceLock::new();
    let lock = LOCK.get_or_init(|| Arc::new(Mutex::new(()))).clone();
    lock.lock_owned().await
}

pub(crate) fn set_test_env() {
    std::env::set_var("LMS_ENV", "test");
    std::env::set_var("LMS_STRICT_CONFIG", "0");
    std::env::set_var("SECRET_KEY", TEST_SECRET_KEY);
    std::env::set_var("ALGORITHM", "HS256");
    std::env::set_var("PROMETHEUS_ENABLED", "0");
    std::env::remove_var("SESSION_KEY_PREFIX");
    std::env::remove_var("VIOLATION_REVIEW_THRESHOLD");
    std::env::remove_var("BLUEPRINT_MAX_VARIANTS");
    std::env::remove_var("BLUEPRINT_VARIANT_CODE_BASE");
}

/// Router over in-memory backends. Nothing outside the process is touched.
pub(crate) async fn setup_test_context() -> TestContext {
    let guard = env_lock().await;
    set_test_env();

    let settings = Settings::load().expect("settings");
    let catalog = Arc::new(MemoryCatalog::default());
    let clock = Arc::new(ManualClock::new(T0));

    let state = AppState::new(
        settings,
        Backends {
            catalog: catalog.clone(),
            store: Arc::new(MemoryStore::default()),
            redis: RedisHandle::new("redis://127.0.0.1:6379/15".to_string()),
            clock: clock.clone(),
            shuffle: Arc::new(ScriptedShuffle::default()),
        },
    );
    let app = api::router::router(state.clone());

    TestContext { state, app, catalog, clock, _guard: guard }
}

pub(crate) fn bearer_token(user_id: &str, role: Role, settings: &Settings) -> String {
    security::create_access_token(user_id, role, settings, Duration::hours(1)).expect("token")
}

pub(crate) fn json_request(
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);

    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    if let Some(body) = body {
        let bytes = serde_json::to_vec(&body).expect("serialize body");
        builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(bytes))
            .expect("request body")
    } else {
        builder.body(Body::empty()).expect("request body")
    }
}

pub(crate) async fn read_json(response: axum::response::Response<Body>) -> serde_json::Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("response body");
    serde_json::from_slice(&body).unwrap_or_else(|err| {
        let body_text = String::from_utf8_lossy(&body);
        panic!("json parse: {err}; body: {body_text}");
    })
}

/// Two options per question: `{id}-correct` and `{id}-wrong`.
pub(crate) fn question(id: &str, lesson_id: &str, level: CognitiveLevel) -> Question {
    Question {
        id: id.to_string(),
        lesson_id: lesson_id.to_string(),
        level,
        content: format!("Question {id}"),
        options: Json(vec![
            AnswerOption {
                id: format!("{id}-correct"),
                content: "right".to_string(),
                is_correct: true,
            },
            AnswerOption { id: format!("{id}-wrong"), content: "wrong".to_string(), is_correct: false },
        ]),
        used_count: 0,
        correct_count: 0,
    }
}

/// Adds `per_variant` recognition questions to `catalog` and returns an exam (not yet stored)
/// with `variants` variants over them. Variant `n` is the base order rotated by `n`.
pub(crate) fn exam_fixture(catalog: &MemoryCatalog, per_variant: usize, variants: usize) -> Exam {
    let exam_id = uuid::Uuid::new_v4().to_string();
    let ids: Vec<String> = (0..per_variant).map(|index| format!("{exam_id}-q{index}")).collect();
    for id in &ids {
        catalog.add_question(question(id, "lesson-1", CognitiveLevel::Recognition));
    }

    let variants = (0..variants)
        .map(|index| {
            let mut question_ids = ids.clone();
            let len = question_ids.len();
            if len > 0 {
                question_ids.rotate_left(index % len);
            }
            ExamVariant { code: (101 + index).to_string(), question_ids }
        })
        .collect();

    Exam {
        id: exam_id,
        title: "Fixture exam".to_string(),
        duration_minutes: 45,
        total_questions: per_variant as i32,
        lesson_ids: Json(vec!["lesson-1".to_string()]),
        level_counts: Json(LevelCounts { recognition: per_variant as u32, ..LevelCounts::default() }),
        variants: Json(variants),
        generation_seed: None,
        created_at: T0,
    }
}

/// An open assignment for `exam` spanning `T0..T0+window`.
pub(crate) fn open_assignment(exam: &Exam, code: &str, window: Duration) -> Assignment {
    Assignment {
        id: uuid::Uuid::new_v4().to_string(),
        exam_id: exam.id.clone(),
        class_id: "10A".to_string(),
        code: code.to_string(),
        status: AssignmentStatus::Open,
        start_time: T0,
        end_time: T0 + window,
        duration_minutes: None,
        max_attempts: 1,
        settings: Json(Default::default()),
        created_at: T0,
        updated_at: T0,
    }
}

#[derive(Default)]
struct CatalogData {
    questions: Vec<Question>,
    exams: HashMap<String, Exam>,
    assignments: HashMap<String, Assignment>,
    submissions: Vec<Submission>,
}

/// In-memory implementation of every catalog trait.
#[derive(Default)]
pub(crate) struct MemoryCatalog {
    data: StdMutex<CatalogData>,
    fail_submissions: AtomicBool,
}

impl MemoryCatalog {
    fn data(&self) -> MutexGuard<'_, CatalogData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn add_question(&self, question: Question) {
        self.data().questions.push(question);
    }

    pub(crate) fn remove_question(&self, id: &str) {
        self.data().questions.retain(|question| question.id != id);
    }

    pub(crate) fn question(&self, id: &str) -> Option<Question> {
        self.data().questions.iter().find(|question| question.id == id).cloned()
    }

    pub(crate) fn submissions(&self) -> Vec<Submission> {
        self.data().submissions.clone()
    }

    /// Makes `create_submission` fail until switched back.
    pub(crate) fn fail_submissions(&self, fail: bool) {
        self.fail_submissions.store(fail, Ordering::SeqCst);
    }

    fn matching(&self, lesson_ids: &[String], level: CognitiveLevel) -> Vec<String> {
        self.data()
            .questions
            .iter()
            .filter(|question| question.level == level && lesson_ids.contains(&question.lesson_id))
            .map(|question| question.id.clone())
            .collect()
    }
}

#[async_trait]
impl QuestionPool for MemoryCatalog {
    async fn count_available(
        &self,
        lesson_ids: &[String],
        level: CognitiveLevel,
    ) -> Result<u64, CatalogError> {
        Ok(self.matching(lesson_ids, level).len() as u64)
    }

    async fn list_available(
        &self,
        lesson_ids: &[String],
        level: CognitiveLevel,
    ) -> Result<Vec<String>, CatalogError> {
        Ok(self.matching(lesson_ids, level))
    }
}

#[async_trait]
impl ExamCatalog for MemoryCatalog {
    async fn find_exam(&self, id: &str) -> Result<Option<Exam>, CatalogError> {
        Ok(self.data().exams.get(id).cloned())
    }

    async fn insert_exam(&self, exam: &Exam) -> Result<(), CatalogError> {
        self.data().exams.insert(exam.id.clone(), exam.clone());
        Ok(())
    }

    async fn find_questions(&self, ids: &[String]) -> Result<Vec<Question>, CatalogError> {
        Ok(self
            .data()
            .questions
            .iter()
            .filter(|question| ids.contains(&question.id))
            .cloned()
            .collect())
    }

    async fn record_question_usage(&self, usage: &[QuestionUsage]) -> Result<(), CatalogError> {
        let mut data = self.data();
        for entry in usage {
            if let Some(question) =
                data.questions.iter_mut().find(|question| question.id == entry.question_id)
            {
                question.used_count += 1;
                if entry.correct {
                    question.correct_count += 1;
                }
            }
        }
        Ok(())
    }

    async fn find_assignment(&self, id: &str) -> Result<Option<Assignment>, CatalogError> {
        Ok(self.data().assignments.get(id).cloned())
    }

    async fn find_assignment_by_code(
        &self,
        code: &str,
    ) -> Result<Option<Assignment>, CatalogError> {
        Ok(self.data().assignments.values().find(|assignment| assignment.code == code).cloned())
    }

    async fn access_code_exists(&self, code: &str) -> Result<bool, CatalogError> {
        Ok(self.data().assignments.values().any(|assignment| assignment.code == code))
    }

    async fn insert_assignment(&self, assignment: &Assignment) -> Result<(), CatalogError> {
        let mut data = self.data();
        if data.assignments.values().any(|existing| existing.code == assignment.code) {
            return Err(CatalogError::Conflict(format!("access code {}", assignment.code)));
        }
        data.assignments.insert(assignment.id.clone(), assignment.clone());
        Ok(())
    }

    async fn update_assignment_status(
        &self,
        id: &str,
        status: AssignmentStatus,
        now: OffsetDateTime,
    ) -> Result<Option<Assignment>, CatalogError> {
        let mut data = self.data();
        Ok(data.assignments.get_mut(id).map(|assignment| {
            assignment.status = status;
            assignment.updated_at = now;
            assignment.clone()
        }))
    }

    async fn close_expired_assignments(&self, now: OffsetDateTime) -> Result<u64, CatalogError> {
        let mut closed = 0;
        for assignment in self.data().assignments.values_mut() {
            if assignment.status == AssignmentStatus::Open && assignment.end_time < now {
                assignment.status = AssignmentStatus::Closed;
                assignment.updated_at = now;
                closed += 1;
            }
        }
        Ok(closed)
    }

    async fn ping(&self) -> Result<(), CatalogError> {
        Ok(())
    }
}

#[async_trait]
impl SubmissionLedger for MemoryCatalog {
    async fn list_for_attempt(
        &self,
        assignment_id: &str,
        student_id: &str,
    ) -> Result<Vec<Submission>, CatalogError> {
        Ok(self
            .data()
            .submissions
            .iter()
            .filter(|submission| {
                submission.assignment_id == assignment_id && submission.student_id == student_id
            })
            .cloned()
            .collect())
    }

    async fn create_submission(&self, submission: &Submission) -> Result<(), CatalogError> {
        if self.fail_submissions.load(Ordering::SeqCst) {
            return Err(CatalogError::Unavailable("submissions are failing".to_string()));
        }
        let mut data = self.data();
        if data.submissions.iter().any(|existing| existing.id == submission.id) {
            return Err(CatalogError::Conflict(format!("submission {}", submission.id)));
        }
        data.submissions.push(submission.clone());
        Ok(())
    }

    async fn find_submission(&self, id: &str) -> Result<Option<Submission>, CatalogError> {
        Ok(self.data().submissions.iter().find(|submission| submission.id == id).cloned())
    }
}

/// Clock that only moves when told to.
pub(crate) struct ManualClock {
    now: StdMutex<OffsetDateTime>,
}

impl ManualClock {
    pub(crate) fn new(start: OffsetDateTime) -> Self {
        Self { now: StdMutex::new(start) }
    }

    pub(crate) fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }

    pub(crate) fn set(&self, at: OffsetDateTime) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Never reorders; `pick` returns queued values in order, then `0`.
#[derive(Default)]
pub(crate) struct ScriptedShuffle {
    picks: StdMutex<VecDeque<usize>>,
}

impl ScriptedShuffle {
    pub(crate) fn with_picks(picks: impl IntoIterator<Item = usize>) -> Self {
        Self { picks: StdMutex::new(picks.into_iter().collect()) }
    }
}

impl ShuffleSource for ScriptedShuffle {
    fn shuffle(&self, _ids: &mut [String]) {}

    fn pick(&self, len: usize) -> usize {
        let next = self.picks.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
        match next {
            Some(index) if index < len => index,
            _ => 0,
        }
    }
}

/// Memory store whose writes can be switched off.
#[derive(Default)]
pub(crate) struct FlakyStore {
    inner: MemoryStore,
    fail_writes: AtomicBool,
}

impl FlakyStore {
    pub(crate) fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("write refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PersistenceStore for FlakyStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.check()?;
        self.inner.set(key, value).await
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        self.check()?;
        self.inner.set_if_absent(key, value).await
    }

    async fn remove(&self, keys: &[String]) -> Result<(), StoreError> {
        self.check()?;
        self.inner.remove(keys).await
    }
}

/// Answer map in the shape the session keeps.
pub(crate) fn answers<const N: usize>(pairs: [(&str, &str); N]) -> BTreeMap<String, String> {
    pairs.into_iter().map(|(question, option)| (question.to_string(), option.to_string())).collect()
}
