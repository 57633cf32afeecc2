use std::sync::Arc;

use quizmaster_core::DynDataStore;
use quizmaster_jobs::QueueHandle;

use crate::cache::CacheHandle;
use crate::config::AppConfig;

/// Shared application state.
///
/// Constructed once at bootstrap and injected everywhere; no hidden
/// singletons. The store, cache and queue handles are trait objects so the
/// backends can differ per deployment without touching handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: DynDataStore,
    pub cache: CacheHandle,
    pub queue: QueueHandle,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(
        store: DynDataStore,
        cache: CacheHandle,
        queue: QueueHandle,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            store,
            cache,
            queue,
            config,
        }
    }
}
