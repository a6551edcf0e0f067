//! Message dispatcher

use super::{HandlerError, HandlerResult};
use crate::protocol::{InboundMessage, ProtocolError};
use parking_lot::RwLock;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Consumer of dispatched frames
///
/// Handlers must treat frame types they do not care about as no-ops.
pub trait MessageHandler: Send + Sync + 'static {
    fn handle(&self, message: &InboundMessage) -> HandlerResult<()>;
}

impl<F> MessageHandler for F
where
    F: Fn(&InboundMessage) -> HandlerResult<()> + Send + Sync + 'static,
{
    fn handle(&self, message: &InboundMessage) -> HandlerResult<()> {
        self(message)
    }
}

/// Identifier of a registered handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type HandlerTable = RwLock<Vec<(HandlerId, Arc<dyn MessageHandler>)>>;

/// Result of feeding one raw frame through the dispatcher
#[derive(Debug)]
pub enum FrameOutcome {
    /// A heartbeat ping; the caller owes the server a `pong`
    Heartbeat,
    /// Delivered to `delivered` handlers, of which `faults` failed
    Dispatched {
        message: InboundMessage,
        delivered: usize,
        faults: Vec<HandlerError>,
    },
    /// The frame could not be decoded and was dropped
    Malformed(ProtocolError),
}

/// Fans inbound frames out to registered handlers
pub struct Dispatcher {
    handlers: Arc<HandlerTable>,
    next_id: AtomicU64,
}

impl Dispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(Vec::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a handler; it stays registered until the guard is disposed
    /// or dropped
    pub fn register(&self, handler: impl MessageHandler) -> HandlerGuard {
        self.register_arc(Arc::new(handler))
    }

    fn register_arc(&self, handler: Arc<dyn MessageHandler>) -> HandlerGuard {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.write().push((id, handler));
        tracing::trace!(handler_id = id.0, "Handler registered");

        HandlerGuard {
            id,
            table: Arc::downgrade(&self.handlers),
        }
    }

    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }

    /// Parse and dispatch a raw text frame
    pub fn handle_frame(&self, text: &str) -> FrameOutcome {
        let message = match InboundMessage::from_json(text) {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!(error = %e, "Failed to parse inbound frame, dropping");
                return FrameOutcome::Malformed(e);
            }
        };

        if message.is_heartbeat() {
            tracing::trace!("Heartbeat ping received");
            return FrameOutcome::Heartbeat;
        }

        let (delivered, faults) = self.dispatch(&message);
        FrameOutcome::Dispatched {
            message,
            delivered,
            faults,
        }
    }

    /// Deliver a decoded frame to every handler registered right now
    ///
    /// Iterates a snapshot, so handlers may register or dispose handlers
    /// (including themselves) while running. Handlers registered during the
    /// call see the next frame, not this one.
    pub fn dispatch(&self, message: &InboundMessage) -> (usize, Vec<HandlerError>) {
        let snapshot: Vec<(HandlerId, Arc<dyn MessageHandler>)> = self.handlers.read().clone();
        let mut faults = Vec::new();

        for (id, handler) in &snapshot {
            let result = panic::catch_unwind(AssertUnwindSafe(|| handler.handle(message)))
                .unwrap_or_else(|payload| Err(HandlerError::Panicked(panic_message(&*payload))));

            if let Err(e) = result {
                tracing::error!(
                    handler_id = id.0,
                    frame_type = %message.kind(),
                    error = %e,
                    "Handler failed"
                );
                faults.push(e);
            }
        }

        (snapshot.len(), faults)
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("handlers", &self.handler_count())
            .finish()
    }
}

/// Disposer returned by [`Dispatcher::register`]
#[must_use = "dropping the guard unregisters the handler"]
#[derive(Debug)]
pub struct HandlerGuard {
    id: HandlerId,
    table: Weak<HandlerTable>,
}

impl HandlerGuard {
    #[must_use]
    pub fn id(&self) -> HandlerId {
        self.id
    }

    /// Unregister now; equivalent to dropping the guard
    pub fn dispose(self) {}

    fn unregister(&self) {
        if let Some(table) = self.table.upgrade() {
            table.write().retain(|(id, _)| *id != self.id);
            tracing::trace!(handler_id = self.id.0, "Handler unregistered");
        }
    }
}

impl Drop for HandlerGuard {
    fn drop(&mut self) {
        self.unregister();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
