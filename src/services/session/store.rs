//! Key-scoped persistence for in-progress attempts.
//!
//! `PersistenceStore` is the raw string interface; `AttemptStorage` layers the typed keys of one
//! (assignment, student) attempt on top of it.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::core::redis::RedisHandle;
use crate::core::time::{from_epoch_millis, to_epoch_millis};

#[derive(Debug, Error)]
pub(crate) enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("failed to encode value for {key}: {source}")]
    Encode { key: String, source: serde_json::Error },
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        Self::Backend(err.to_string())
    }
}

#[async_trait]
pub(crate) trait PersistenceStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Writes only when the key is missing. Returns whether this call wrote it.
    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool, StoreError>;

    async fn remove(&self, keys: &[String]) -> Result<(), StoreError>;
}

/// Process-local store. Used when Redis is unreachable and in tests.
#[derive(Default)]
pub(crate) struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

#[async_trait]
impl PersistenceStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.write().await.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(true)
    }

    async fn remove(&self, keys: &[String]) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }
}

/// Redis-backed store; attempts survive API restarts and are shared between instances.
#[derive(Clone)]
pub(crate) struct RedisStore {
    redis: RedisHandle,
}

impl RedisStore {
    pub(crate) fn new(redis: RedisHandle) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl PersistenceStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.redis.get(key).await?)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        Ok(self.redis.set(key, value).await?)
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        Ok(self.redis.set_nx(key, value).await?)
    }

    async fn remove(&self, keys: &[String]) -> Result<(), StoreError> {
        self.redis.del(keys).await?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttemptKeys {
    start: String,
    answers: String,
    violations: String,
    variant_index: String,
}

impl AttemptKeys {
    fn new(prefix: &str, assignment_id: &str, student_id: &str) -> Self {
        let base = format!("{prefix}_{assignment_id}_{student_id}");
        Self {
            start: format!("{base}_start"),
            answers: format!("{base}_answers"),
            violations: format!("{base}_violations"),
            variant_index: format!("{base}_variant_idx"),
        }
    }

    fn all(&self) -> [String; 4] {
        [
            self.start.clone(),
            self.answers.clone(),
            self.violations.clone(),
            self.variant_index.clone(),
        ]
    }
}

/// Typed view over the four keys of one attempt.
///
/// Unreadable or corrupted values are reported as absent and logged; callers then fall back to
/// fresh defaults.
#[derive(Clone)]
pub(crate) struct AttemptStorage {
    store: Arc<dyn PersistenceStore>,
    keys: AttemptKeys,
}

impl AttemptStorage {
    pub(crate) fn new(
        store: Arc<dyn PersistenceStore>,
        prefix: &str,
        assignment_id: &str,
        student_id: &str,
    ) -> Self {
        Self { store, keys: AttemptKeys::new(prefix, assignment_id, student_id) }
    }

    pub(crate) async fn start_time(&self) -> Option<OffsetDateTime> {
        let raw = self.read(&self.keys.start).await?;
        let parsed = raw.trim().parse::<i64>().ok().and_then(from_epoch_millis);
        if parsed.is_none() {
            tracing::warn!(key = %self.keys.start, "ignoring corrupted attempt start time");
        }
        parsed
    }

    /// Stores `now` unless a start time already exists, and returns whichever value won.
    pub(crate) async fn set_start_time_once(
        &self,
        now: OffsetDateTime,
    ) -> Result<OffsetDateTime, StoreError> {
        let encoded = to_epoch_millis(now).to_string();
        if self.store.set_if_absent(&self.keys.start, &encoded).await? {
            return Ok(now);
        }

        match self.start_time().await {
            Some(existing) => Ok(existing),
            None => {
                self.store.set(&self.keys.start, &encoded).await?;
                Ok(now)
            }
        }
    }

    pub(crate) async fn variant_index(&self, variant_count: usize) -> Option<usize> {
        let raw = self.read(&self.keys.variant_index).await?;
        let parsed = raw.trim().parse::<usize>().ok().filter(|index| *index < variant_count);
        if parsed.is_none() {
            tracing::warn!(key = %self.keys.variant_index, "ignoring invalid variant index");
        }
        parsed
    }

    /// Same contract as [`Self::set_start_time_once`] for the pinned variant.
    pub(crate) async fn set_variant_index_once(
        &self,
        index: usize,
        variant_count: usize,
    ) -> Result<usize, StoreError> {
        let encoded = index.to_string();
        if self.store.set_if_absent(&self.keys.variant_index, &encoded).await? {
            return Ok(index);
        }

        match self.variant_index(variant_count).await {
            Some(existing) => Ok(existing),
            None => {
                self.store.set(&self.keys.variant_index, &encoded).await?;
                Ok(index)
            }
        }
    }

    pub(crate) async fn answers(&self) -> BTreeMap<String, String> {
        let Some(raw) = self.read(&self.keys.answers).await else {
            return BTreeMap::new();
        };
        serde_json::from_str(&raw).unwrap_or_else(|err| {
            tracing::warn!(key = %self.keys.answers, error = %err, "ignoring corrupted answers");
            BTreeMap::new()
        })
    }

    pub(crate) async fn set_answers(
        &self,
        answers: &BTreeMap<String, String>,
    ) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(answers)
            .map_err(|source| StoreError::Encode { key: self.keys.answers.clone(), source })?;
        self.store.set(&self.keys.answers, &encoded).await
    }

    pub(crate) async fn clear_answers(&self) -> Result<(), StoreError> {
        self.store.remove(std::slice::from_ref(&self.keys.answers)).await
    }

    pub(crate) async fn violations(&self) -> u32 {
        let Some(raw) = self.read(&self.keys.violations).await else {
            return 0;
        };
        raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key = %self.keys.violations, "ignoring corrupted violation count");
            0
        })
    }

    pub(crate) async fn set_violations(&self, count: u32) -> Result<(), StoreError> {
        self.store.set(&self.keys.violations, &count.to_string()).await
    }

    pub(crate) async fn clear_all(&self) -> Result<(), StoreError> {
        self.store.remove(&self.keys.all()).await
    }

    async fn read(&self, key: &str) -> Option<String> {
        match self.store.get(key).await {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(key, error = %err, "attempt state read failed; treating as absent");
                None
            }
        }
    }
}
