use std::sync::Arc;

use crate::core::clock::Clock;
use crate::core::{config::Settings, redis::RedisHandle};
use crate::repositories::Catalog;
use crate::services::session::{PersistenceStore, SessionContext, SessionRegistry};
use crate::services::shuffle::ShuffleSource;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    catalog: Arc<dyn Catalog>,
    store: Arc<dyn PersistenceStore>,
    redis: RedisHandle,
    clock: Arc<dyn Clock>,
    shuffle: Arc<dyn ShuffleSource>,
    sessions: Arc<SessionRegistry>,
}

/// Backends the state is assembled from.
pub(crate) struct Backends {
    pub(crate) catalog: Arc<dyn Catalog>,
    pub(crate) store: Arc<dyn PersistenceStore>,
    pub(crate) redis: RedisHandle,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) shuffle: Arc<dyn ShuffleSource>,
}

impl AppState {
    pub(crate) fn new(settings: Settings, backends: Backends) -> Self {
        let Backends { catalog, store, redis, clock, shuffle } = backends;
        Self {
            inner: Arc::new(InnerState {
                settings,
                catalog,
                store,
                redis,
                clock,
                shuffle,
                sessions: Arc::new(SessionRegistry::new()),
            }),
        }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn catalog(&self) -> &Arc<dyn Catalog> {
        &self.inner.catalog
    }

    pub(crate) fn redis(&self) -> &RedisHandle {
        &self.inner.redis
    }

    pub(crate) fn clock(&self) -> &dyn Clock {
        self.inner.clock.as_ref()
    }

    pub(crate) fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.inner.sessions
    }

    pub(crate) fn session_context(&self) -> SessionContext {
        let session = self.inner.settings.session();
        SessionContext {
            catalog: self.inner.catalog.clone(),
            store: self.inner.store.clone(),
            clock: self.inner.clock.clone(),
            shuffle: self.inner.shuffle.clone(),
            key_prefix: session.key_prefix.clone(),
            review_threshold: session.violation_review_threshold,
        }
    }
}
