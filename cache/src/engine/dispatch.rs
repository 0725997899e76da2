use std::sync::Arc;

use tokio::sync::{RwLock, RwLockReadGuard, mpsc};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::entity_cache::EntityCache;
use super::events::CacheEvent;
use crate::error::CacheResult;

/// Default bound of the inbound event queue.
pub const DEFAULT_EVENT_QUEUE: usize = 1024;

/// Shared access to one [`EntityCache`].
///
/// All writes go through the write lock, one event at a time, so the merge
/// and its permission cascade are observed atomically by readers.
#[derive(Clone, Default)]
pub struct CacheHandle {
    cache: Arc<RwLock<EntityCache>>,
}

/// Outcome counts of an event loop run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventLoopStats {
    pub applied: usize,
    pub dropped: usize,
}

impl CacheHandle {
    pub fn new(cache: EntityCache) -> Self {
        Self {
            cache: Arc::new(RwLock::new(cache)),
        }
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, EntityCache> {
        self.cache.read().await
    }

    /// Apply one event under the write lock, returning its error to the
    /// caller.
    pub async fn apply(&self, event: &CacheEvent) -> CacheResult<()> {
        self.cache.write().await.apply(event)
    }

    /// Spawn the task that drains the event queue in arrival order.
    ///
    /// Events that fail to apply are logged and dropped; the loop ends once
    /// every sender is gone.
    pub fn spawn_event_loop(
        &self,
        queue: usize,
    ) -> (mpsc::Sender<CacheEvent>, JoinHandle<EventLoopStats>) {
        let (tx, mut rx) = mpsc::channel::<CacheEvent>(queue.max(1));
        let handle = self.clone();

        let task = tokio::spawn(async move {
            let mut stats = EventLoopStats::default();
            while let Some(event) = rx.recv().await {
                match handle.apply(&event).await {
                    Ok(()) => stats.applied += 1,
                    Err(e) => {
                        warn!(
                            kind = event.kind(),
                            server_id = event.server_id().unwrap_or("-"),
                            error = %e,
                            "dropped cache event"
                        );
                        stats.dropped += 1;
                    }
                }
            }
            info!(applied = stats.applied, dropped = stats.dropped, "event loop finished");
            stats
        });

        (tx, task)
    }
}
