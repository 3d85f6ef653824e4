//! Live attempts held in memory between requests.
//!
//! The registry is a cache: every attempt can be rebuilt from the persistence store, so entries
//! are dropped freely once they complete or go idle.

use std::collections::HashMap;
use std::sync::Arc;

use time::{Duration, OffsetDateTime};
use tokio::sync::{Mutex, RwLock};

use super::engine::{ExamSession, Opened, SessionContext, SessionError, SessionPhase};

pub(crate) type SharedSession = Arc<Mutex<ExamSession>>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct AttemptKey {
    pub(crate) assignment_id: String,
    pub(crate) student_id: String,
}

impl AttemptKey {
    pub(crate) fn new(assignment_id: &str, student_id: &str) -> Self {
        Self { assignment_id: assignment_id.to_string(), student_id: student_id.to_string() }
    }
}

pub(crate) enum Attempt {
    Live(SharedSession),
    Exhausted { submission_id: String },
    Submitted { submission_id: String, auto_submitted: bool },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TickReport {
    pub(crate) auto_submitted: usize,
    pub(crate) failed: usize,
    pub(crate) released: usize,
}

#[derive(Default)]
pub(crate) struct SessionRegistry {
    sessions: RwLock<HashMap<AttemptKey, SharedSession>>,
}

impl SessionRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn get(&self, key: &AttemptKey) -> Option<SharedSession> {
        self.sessions.read().await.get(key).cloned()
    }

    pub(crate) async fn remove(&self, key: &AttemptKey) -> Option<SharedSession> {
        self.sessions.write().await.remove(key)
    }

    pub(crate) async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Returns the cached attempt, or loads it from storage, starting it when none is in
    /// progress. A completed cached attempt is reloaded so a further attempt can start when the
    /// limit allows it.
    pub(crate) async fn start(
        &self,
        ctx: &SessionContext,
        assignment_id: &str,
        student_id: &str,
    ) -> Result<Attempt, SessionError> {
        let key = AttemptKey::new(assignment_id, student_id);
        if let Some(existing) = self.get(&key).await {
            let completed = existing.lock().await.phase() == SessionPhase::Completed;
            if !completed {
                return Ok(Attempt::Live(existing));
            }
            self.remove(&key).await;
        }

        let opened = ExamSession::open(ctx, assignment_id, student_id).await?;
        Ok(self.adopt(key, opened).await)
    }

    /// Like [`Self::start`] but only for an attempt already in progress, or a pointer to the
    /// latest submission when there is none. A completed cached attempt is returned as is so
    /// repeated submits see the same result.
    pub(crate) async fn resume(
        &self,
        ctx: &SessionContext,
        assignment_id: &str,
        student_id: &str,
    ) -> Result<Attempt, SessionError> {
        let key = AttemptKey::new(assignment_id, student_id);
        if let Some(existing) = self.get(&key).await {
            return Ok(Attempt::Live(existing));
        }

        let opened = ExamSession::resume(ctx, assignment_id, student_id).await?;
        Ok(self.adopt(key, opened).await)
    }

    async fn adopt(&self, key: AttemptKey, opened: Opened) -> Attempt {
        match opened {
            Opened::Exhausted { submission_id } => Attempt::Exhausted { submission_id },
            Opened::Submitted { submission_id, auto_submitted } => {
                Attempt::Submitted { submission_id, auto_submitted }
            }
            Opened::Live(session) => {
                let mut sessions = self.sessions.write().await;
                // Another request may have loaded the same attempt meanwhile; keep the first.
                let shared =
                    sessions.entry(key).or_insert_with(|| Arc::new(Mutex::new(*session))).clone();
                Attempt::Live(shared)
            }
        }
    }

    /// Advances every live attempt's timer and releases the completed ones.
    pub(crate) async fn tick_all(&self) -> TickReport {
        let snapshot: Vec<(AttemptKey, SharedSession)> = self
            .sessions
            .read()
            .await
            .iter()
            .map(|(key, session)| (key.clone(), session.clone()))
            .collect();

        let mut report = TickReport::default();
        let mut finished = Vec::new();
        for (key, shared) in snapshot {
            let mut session = shared.lock().await;
            match session.tick().await {
                Ok(true) => report.auto_submitted += 1,
                Ok(false) => {}
                Err(err) => {
                    report.failed += 1;
                    tracing::warn!(
                        assignment_id = %key.assignment_id,
                        student_id = %key.student_id,
                        error = %err,
                        "automatic submission failed; retrying on next tick"
                    );
                }
            }
            if session.phase() == SessionPhase::Completed {
                finished.push(key);
            }
        }

        if !finished.is_empty() {
            let mut sessions = self.sessions.write().await;
            for key in &finished {
                sessions.remove(key);
            }
            report.released = finished.len();
        }
        report
    }

    /// Drops attempts nobody has touched for `idle`. Their state stays in the persistence store
    /// and they are reloaded on the next request. Busy attempts are skipped.
    pub(crate) async fn evict_idle(&self, now: OffsetDateTime, idle: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, shared| match shared.try_lock() {
            Ok(session) => now - session.last_contact() <= idle,
            Err(_) => true,
        });
        let evicted = before - sessions.len();
        if evicted > 0 {
            tracing::debug!(evicted, "evicted idle attempt sessions");
        }
        evicted
    }
}
