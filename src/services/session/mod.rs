//! Runtime of a single student attempt: timing, autosave, integrity tracking and submission.

mod engine;
mod integrity;
mod registry;
mod store;
mod timing;

pub(crate) use engine::{
    ExamSession, QuestionView, SessionContext, SessionError, SessionPhase, SubmitMode,
};
pub(crate) use integrity::{IntegritySignal, SignalBatch};
pub(crate) use registry::{Attempt, AttemptKey, SessionRegistry, SharedSession};
pub(crate) use store::{MemoryStore, PersistenceStore, RedisStore};

#[cfg(test)]
pub(crate) use store::StoreError;
