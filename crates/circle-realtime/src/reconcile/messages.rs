//! New-message reconciliation

use super::cache::{MessageApplied, ViewCache};
use super::dedup::DedupSet;
use crate::connection::RealtimeClient;
use crate::dispatch::{HandlerGuard, HandlerResult};
use crate::protocol::{CircleMessage, InboundMessage, NewMessageEvent};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

type DedupTable = Arc<Mutex<HashMap<String, DedupSet>>>;

/// Appends pushed messages to the view cache, at most once per message id
///
/// Between [`start`](Self::start) and [`stop`](Self::stop) every
/// `circle_message:new` frame is applied to the cache. Recent ids are kept per
/// circle and forgotten whenever the scope changes; the cache itself refuses
/// any id a circle already lists.
pub struct MessageReconciler {
    client: RealtimeClient,
    cache: ViewCache,
    dedup: DedupTable,
    capacity: usize,
    guard: Mutex<Option<HandlerGuard>>,
}

impl MessageReconciler {
    #[must_use]
    pub fn new(client: RealtimeClient, cache: ViewCache) -> Self {
        let capacity = client.config().dedup_capacity;
        Self {
            client,
            cache,
            dedup: Arc::new(Mutex::new(HashMap::new())),
            capacity,
            guard: Mutex::new(None),
        }
    }

    /// Begin applying pushed messages; no-op if already started
    pub fn start(&self) {
        let mut guard = self.guard.lock();
        if guard.is_some() {
            return;
        }

        let cache = self.cache.clone();
        let dedup = self.dedup.clone();
        let capacity = self.capacity;
        *guard = Some(self.client.register_handler(
            move |message: &InboundMessage| -> HandlerResult<()> {
                if let InboundMessage::CircleMessageNew(event) = message {
                    apply(&cache, &dedup, capacity, event);
                }
                Ok(())
            },
        ));
        tracing::debug!(client_id = %self.client.id(), "Message reconciler started");
    }

    /// Stop applying messages and forget dedup state
    pub fn stop(&self) {
        let guard = self.guard.lock().take();
        if guard.is_some() {
            drop(guard);
            self.dedup.lock().clear();
            tracing::debug!(client_id = %self.client.id(), "Message reconciler stopped");
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.guard.lock().is_some()
    }

    /// Switch the on-screen circle
    pub fn view_circle(&self, circle_id: Option<&str>) {
        self.cache.set_active_circle(circle_id);
        self.dedup.lock().clear();
    }

    /// Seed a circle from fetched history
    ///
    /// The loaded ids are remembered so a push of the same message is not
    /// applied twice.
    pub fn load_history(&self, circle_id: &str, messages: Vec<CircleMessage>) {
        {
            let mut dedup = self.dedup.lock();
            let seen = dedup
                .entry(circle_id.to_owned())
                .or_insert_with(|| DedupSet::new(self.capacity));
            for message in &messages {
                seen.insert(&message.id);
            }
        }
        self.cache.load_messages(circle_id, messages);
    }

    /// Apply one event directly, as the handler would
    ///
    /// Returns `true` if the message was new.
    pub fn apply(&self, event: &NewMessageEvent) -> bool {
        apply(&self.cache, &self.dedup, self.capacity, event)
    }

    #[must_use]
    pub fn cache(&self) -> &ViewCache {
        &self.cache
    }
}

impl std::fmt::Debug for MessageReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageReconciler")
            .field("active", &self.is_active())
            .field("capacity", &self.capacity)
            .finish()
    }
}

fn apply(cache: &ViewCache, dedup: &DedupTable, capacity: usize, event: &NewMessageEvent) -> bool {
    let fresh = dedup
        .lock()
        .entry(event.circle_id.clone())
        .or_insert_with(|| DedupSet::new(capacity))
        .insert(&event.message.id);

    if !fresh {
        tracing::trace!(circle_id = %event.circle_id, message_id = %event.message.id, "Duplicate message ignored");
        return false;
    }

    let applied = cache.apply_new_message(&event.circle_id, event.message.clone());
    if applied == MessageApplied::Duplicate {
        tracing::trace!(circle_id = %event.circle_id, message_id = %event.message.id, "Message already listed");
        return false;
    }
    tracing::debug!(
        circle_id = %event.circle_id,
        message_id = %event.message.id,
        counted = applied == MessageApplied::Counted,
        "Message applied"
    );
    true
}
