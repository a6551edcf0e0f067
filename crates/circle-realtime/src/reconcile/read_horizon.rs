//! Read-horizon reconciliation

use super::cache::ViewCache;
use crate::connection::RealtimeClient;
use crate::dispatch::{HandlerGuard, HandlerResult};
use crate::protocol::InboundMessage;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Applies `circle:read_horizon` pushes to the unread counters
///
/// Horizons only move forward; an older horizon than the cached one is
/// ignored. Nothing is written back to the backend.
pub struct ReadHorizonReconciler {
    client: RealtimeClient,
    cache: ViewCache,
    guard: Mutex<Option<HandlerGuard>>,
}

impl ReadHorizonReconciler {
    #[must_use]
    pub fn new(client: RealtimeClient, cache: ViewCache) -> Self {
        Self {
            client,
            cache,
            guard: Mutex::new(None),
        }
    }

    pub fn start(&self) {
        let mut guard = self.guard.lock();
        if guard.is_some() {
            return;
        }

        let cache = self.cache.clone();
        *guard = Some(self.client.register_handler(
            move |message: &InboundMessage| -> HandlerResult<()> {
                if let InboundMessage::ReadHorizon(event) = message {
                    apply(&cache, &event.circle_id, event.last_read_at);
                }
                Ok(())
            },
        ));
    }

    pub fn stop(&self) {
        self.guard.lock().take();
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.guard.lock().is_some()
    }

    /// Apply a horizon the caller just confirmed with the backend
    pub fn apply_local(&self, circle_id: &str, at: DateTime<Utc>) -> Option<u64> {
        apply(&self.cache, circle_id, at)
    }
}

impl std::fmt::Debug for ReadHorizonReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadHorizonReconciler")
            .field("active", &self.is_active())
            .finish()
    }
}

fn apply(cache: &ViewCache, circle_id: &str, at: DateTime<Utc>) -> Option<u64> {
    let cleared = cache.apply_read_horizon(circle_id, at);
    match cleared {
        Some(cleared) => tracing::debug!(
            circle_id = %circle_id,
            cleared,
            total = cache.unread_total(),
            "Read horizon applied"
        ),
        None => tracing::trace!(circle_id = %circle_id, "Stale read horizon ignored"),
    }
    cleared
}
