//! Realtime client
//!
//! A single logical connection with a desired room set and a bounded
//! outbound queue that both survive reconnects.
//!
//! Every mutation happens under one short-lived state lock as a complete
//! read-modify-write. Handlers run with no client lock held, so they are free
//! to call back into the client.

use super::backoff::Backoff;
use super::state::ConnectionState;
use super::transport::{Transport, TransportConnection, TransportError, TransportEvents};
use super::websocket::WebSocketTransport;
use crate::dispatch::{Dispatcher, FrameOutcome, HandlerGuard, MessageHandler};
use crate::protocol::OutboundMessage;
use crate::subscription::{OutboundQueue, RoomRegistry};
use crate::time::{Clock, TokioClock};
use circle_common::{ClientError, ClientResult, RealtimeConfig};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

/// Counters describing the client's lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientStats {
    /// Transport opens attempted
    pub connect_attempts: u64,
    /// Transport opens that reached `Connected`
    pub connections_established: u64,
    /// Reconnects scheduled after a failure
    pub reconnects_scheduled: u64,
    /// Frames written to the transport
    pub frames_sent: u64,
    /// Frames appended to the outbound queue
    pub frames_queued: u64,
    /// Frames lost to queue overflow
    pub frames_dropped: u64,
    /// Frames received on a live connection
    pub frames_received: u64,
    /// Inbound frames that failed to decode
    pub malformed_frames: u64,
    /// Handler invocations that failed or panicked
    pub handler_faults: u64,
}

/// What happened to an outbound frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Written to the live transport
    Sent,
    /// Held for the next connection; `dropped` older frames were evicted
    Queued { dropped: usize },
    /// Not accepted: disabled, unauthenticated, or unserializable
    Rejected,
}

/// Mutable client state, guarded by a single lock
struct ClientState {
    connection: ConnectionState,
    /// Bumped on every open, failure and disconnect; events and timers
    /// carrying an older value are stale
    generation: u64,
    link: Option<Box<dyn TransportConnection>>,
    intentional_close: bool,
    authenticated: bool,
    attempt: u32,
    reconnect_timer: Option<crate::time::TimerId>,
    rooms: RoomRegistry,
    queue: OutboundQueue,
    rng: StdRng,
    last_inbound_ms: Option<u64>,
    last_error: Option<ClientError>,
    stats: ClientStats,
}

impl ClientState {
    /// Write a frame to the live link
    fn transmit(&mut self, frame: &str) -> Result<(), TransportError> {
        let link = self.link.as_ref().ok_or(TransportError::Closed)?;
        link.send(frame)?;
        self.stats.frames_sent += 1;
        Ok(())
    }

    /// Queue a frame, recording any backpressure drops
    fn enqueue(&mut self, frame: String) -> usize {
        let dropped = self.queue.push(frame);
        self.stats.frames_queued += 1;
        if dropped > 0 {
            self.stats.frames_dropped += dropped as u64;
            self.record_error(ClientError::Backpressure(dropped));
        }
        dropped
    }

    /// Keep `error` as the most recent fault
    fn record_error(&mut self, error: ClientError) {
        tracing::debug!(
            error_code = %error.error_code(),
            recoverable = error.is_recoverable(),
            error = %error,
            "Client fault recorded"
        );
        self.last_error = Some(error);
    }
}

pub(crate) struct ClientInner {
    id: Uuid,
    config: RealtimeConfig,
    backoff: Backoff,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    dispatcher: Dispatcher,
    state: Mutex<ClientState>,
    state_tx: watch::Sender<ConnectionState>,
}

impl ClientInner {
    fn set_connection(&self, st: &mut ClientState, next: ConnectionState) {
        if st.connection != next {
            tracing::debug!(
                client_id = %self.id,
                from = %st.connection,
                to = %next,
                "Connection state changed"
            );
            st.connection = next;
            self.state_tx.send_replace(next);
        }
    }

    /// Open a transport if the client is idle, allowed, and wanted
    fn start_connect(self: &Arc<Self>) {
        let mut st = self.state.lock();

        if !st.authenticated {
            tracing::debug!(client_id = %self.id, "Connect ignored, not authenticated");
            st.record_error(ClientError::Unauthenticated);
            return;
        }
        if st.connection != ConnectionState::Disconnected {
            return;
        }

        st.intentional_close = false;
        if let Some(timer) = st.reconnect_timer.take() {
            self.clock.cancel(timer);
        }

        st.generation += 1;
        let generation = st.generation;
        st.stats.connect_attempts += 1;
        self.set_connection(&mut st, ConnectionState::Connecting);

        tracing::info!(
            client_id = %self.id,
            url = %self.config.url,
            attempt = st.attempt,
            generation,
            "Connecting"
        );

        let events = TransportEvents::new(generation, Arc::downgrade(self));
        match self.transport.open(&self.config.url, events) {
            Ok(link) => st.link = Some(link),
            Err(e) => {
                tracing::warn!(client_id = %self.id, error = %e, "Transport construction failed");
                self.fail_locked(&mut st, e);
            }
        }
    }

    pub(crate) fn handle_open(self: &Arc<Self>, generation: u64) {
        let mut st = self.state.lock();
        if st.generation != generation || st.connection != ConnectionState::Connecting {
            tracing::trace!(client_id = %self.id, generation, "Ignoring stale open");
            return;
        }

        st.attempt = 0;
        st.stats.connections_established += 1;
        self.set_connection(&mut st, ConnectionState::Connected);

        let rooms = st.rooms.snapshot();
        for room in &rooms {
            match OutboundMessage::subscribe(room.as_str()).to_json() {
                Ok(frame) => {
                    if let Err(e) = st.transmit(&frame) {
                        tracing::warn!(client_id = %self.id, room = %room, error = %e, "Resubscribe failed");
                    }
                }
                Err(e) => tracing::warn!(client_id = %self.id, room = %room, error = %e, "Failed to encode subscribe"),
            }
        }

        let mut pending = st.queue.drain().into_iter();
        let mut flushed = 0usize;
        while let Some(frame) = pending.next() {
            if let Err(e) = st.transmit(&frame) {
                tracing::warn!(client_id = %self.id, error = %e, "Flush interrupted, re-queueing");
                let rest: Vec<String> = std::iter::once(frame).chain(pending).collect();
                let dropped = st.queue.requeue_front(rest);
                st.stats.frames_dropped += dropped as u64;
                break;
            }
            flushed += 1;
        }

        tracing::info!(
            client_id = %self.id,
            generation,
            rooms = rooms.len(),
            flushed,
            "Connected"
        );
    }

    pub(crate) fn handle_frame(self: &Arc<Self>, generation: u64, text: &str) {
        {
            let mut st = self.state.lock();
            if st.generation != generation || st.connection != ConnectionState::Connected {
                tracing::trace!(client_id = %self.id, generation, "Ignoring frame from stale connection");
                return;
            }
            if !st.authenticated {
                return;
            }
            st.stats.frames_received += 1;
        }

        // Handlers run without the state lock
        let outcome = self.dispatcher.handle_frame(text);

        let mut st = self.state.lock();
        match outcome {
            FrameOutcome::Heartbeat => {
                if st.generation != generation {
                    return;
                }
                match OutboundMessage::Pong.to_json() {
                    Ok(pong) => {
                        if let Err(e) = st.transmit(&pong) {
                            tracing::debug!(client_id = %self.id, error = %e, "Failed to answer heartbeat");
                        }
                    }
                    Err(e) => tracing::warn!(client_id = %self.id, error = %e, "Failed to encode pong"),
                }
                st.last_inbound_ms = Some(self.clock.now_ms());
            }
            FrameOutcome::Dispatched { message, faults, .. } => {
                tracing::trace!(client_id = %self.id, frame = %message, "Dispatched");
                st.last_inbound_ms = Some(self.clock.now_ms());
                if let Some(last) = faults.last() {
                    st.stats.handler_faults += faults.len() as u64;
                    st.record_error(last.clone().into());
                }
            }
            FrameOutcome::Malformed(e) => {
                st.stats.malformed_frames += 1;
                st.record_error(e.into());
            }
        }
    }

    pub(crate) fn handle_close(self: &Arc<Self>, generation: u64, reason: Option<String>) {
        let mut st = self.state.lock();
        if st.generation != generation {
            tracing::trace!(client_id = %self.id, generation, "Ignoring stale close");
            return;
        }
        tracing::info!(client_id = %self.id, reason = ?reason, "Connection closed");
        self.fail_locked(&mut st, TransportError::Closed);
    }

    pub(crate) fn handle_failure(self: &Arc<Self>, generation: u64, error: TransportError) {
        let mut st = self.state.lock();
        if st.generation != generation {
            tracing::trace!(client_id = %self.id, generation, "Ignoring stale failure");
            return;
        }
        tracing::warn!(client_id = %self.id, error = %error, "Connection failed");
        self.fail_locked(&mut st, error);
    }

    /// Drop the link and, unless the close was intentional, schedule a
    /// reconnect
    fn fail_locked(self: &Arc<Self>, st: &mut ClientState, error: TransportError) {
        st.generation += 1;
        st.link = None;
        st.record_error(error.into());
        self.set_connection(st, ConnectionState::Disconnected);

        if st.intentional_close || !st.authenticated || !self.config.enabled {
            return;
        }

        let delay = self.backoff.delay(st.attempt, &mut st.rng);
        st.attempt = st.attempt.saturating_add(1);
        st.stats.reconnects_scheduled += 1;

        let generation = st.generation;
        let weak: Weak<Self> = Arc::downgrade(self);
        if let Some(previous) = st.reconnect_timer.take() {
            self.clock.cancel(previous);
        }
        st.reconnect_timer = Some(self.clock.schedule(
            delay,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.on_reconnect_timer(generation);
                }
            }),
        ));

        tracing::info!(
            client_id = %self.id,
            attempt = st.attempt,
            delay_ms = crate::time::as_millis(delay),
            "Reconnect scheduled"
        );
    }

    fn on_reconnect_timer(self: &Arc<Self>, generation: u64) {
        {
            let mut st = self.state.lock();
            if st.generation != generation
                || st.connection != ConnectionState::Disconnected
                || st.intentional_close
            {
                return;
            }
            st.reconnect_timer = None;
        }
        self.start_connect();
    }

    fn teardown(&self, why: &'static str) {
        let link = {
            let mut st = self.state.lock();
            st.intentional_close = true;
            if let Some(timer) = st.reconnect_timer.take() {
                self.clock.cancel(timer);
            }
            st.queue.clear();
            st.rooms.clear();
            st.attempt = 0;
            st.generation += 1;
            self.set_connection(&mut st, ConnectionState::Disconnected);
            st.link.take()
        };

        if let Some(link) = link {
            link.close();
        }
        tracing::info!(client_id = %self.id, reason = why, "Disconnected");
    }
}

/// Realtime synchronization client
///
/// Cheap to clone; clones share one connection.
#[derive(Clone)]
pub struct RealtimeClient {
    inner: Arc<ClientInner>,
}

impl RealtimeClient {
    /// Create a client with an explicit transport and clock
    pub fn new(config: RealtimeConfig, transport: Arc<dyn Transport>, clock: Arc<dyn Clock>) -> Self {
        Self::from_parts(config, transport, clock, StdRng::from_entropy(), false)
    }

    #[must_use]
    pub fn builder(config: RealtimeConfig) -> RealtimeClientBuilder {
        RealtimeClientBuilder::new(config)
    }

    fn from_parts(
        config: RealtimeConfig,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        rng: StdRng,
        authenticated: bool,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let inner = ClientInner {
            id: Uuid::new_v4(),
            backoff: Backoff::from_config(&config),
            state: Mutex::new(ClientState {
                connection: ConnectionState::Disconnected,
                generation: 0,
                link: None,
                intentional_close: false,
                authenticated,
                attempt: 0,
                reconnect_timer: None,
                rooms: RoomRegistry::new(),
                queue: OutboundQueue::new(config.queue_capacity),
                rng,
                last_inbound_ms: None,
                last_error: None,
                stats: ClientStats::default(),
            }),
            config,
            transport,
            clock,
            dispatcher: Dispatcher::new(),
            state_tx,
        };

        Self {
            inner: Arc::new(inner),
        }
    }

    /// Unique id of this client instance, present in every log line
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    #[must_use]
    pub fn config(&self) -> &RealtimeConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }

    fn enabled(&self) -> bool {
        if !self.inner.config.enabled {
            tracing::trace!(client_id = %self.inner.id, "Realtime disabled, ignoring call");
        }
        self.inner.config.enabled
    }

    // === Lifecycle ===

    /// Open the connection
    ///
    /// No-op when already connecting or connected, when disabled, or when
    /// not authenticated. Never fails; transport errors schedule a reconnect.
    pub fn connect(&self) {
        if self.enabled() {
            self.inner.start_connect();
        }
    }

    /// Close the connection for good
    ///
    /// Cancels any pending reconnect and forgets queued frames and desired
    /// rooms. Only an explicit [`connect`](Self::connect) reopens.
    pub fn disconnect(&self) {
        if self.enabled() {
            self.inner.teardown("disconnect requested");
        }
    }

    /// Gate the client on the caller's session
    ///
    /// Dropping from authenticated to unauthenticated tears the connection
    /// down immediately.
    pub fn set_authenticated(&self, authenticated: bool) {
        if !self.enabled() {
            return;
        }
        let was = {
            let mut st = self.inner.state.lock();
            std::mem::replace(&mut st.authenticated, authenticated)
        };
        if was && !authenticated {
            self.inner.teardown("logged out");
        }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner.state.lock().authenticated
    }

    // === Rooms ===

    /// Add a room to the desired set, joining it now if connected
    pub fn subscribe(&self, room: &str) {
        if !self.enabled() {
            return;
        }
        let mut st = self.inner.state.lock();
        if !st.authenticated {
            tracing::debug!(client_id = %self.inner.id, room = %room, "Subscribe ignored, not authenticated");
            st.record_error(ClientError::Unauthenticated);
            return;
        }
        if !st.rooms.add(room) {
            return;
        }
        tracing::debug!(client_id = %self.inner.id, room = %room, "Room desired");

        if st.connection.is_connected() {
            self.send_control(&mut st, &OutboundMessage::subscribe(room));
        }
    }

    /// Remove a room from the desired set, leaving it now if connected
    pub fn unsubscribe(&self, room: &str) {
        if !self.enabled() {
            return;
        }
        let mut st = self.inner.state.lock();
        if !st.rooms.remove(room) {
            return;
        }
        tracing::debug!(client_id = %self.inner.id, room = %room, "Room no longer desired");

        if st.connection.is_connected() {
            self.send_control(&mut st, &OutboundMessage::unsubscribe(room));
        }
    }

    /// Join/leave frames are not queued; the registry replays joins on the
    /// next connection instead
    fn send_control(&self, st: &mut ClientState, message: &OutboundMessage) {
        let result = message
            .to_json()
            .map_err(|e| TransportError::Io(e.to_string()))
            .and_then(|frame| st.transmit(&frame));
        if let Err(e) = result {
            tracing::debug!(client_id = %self.inner.id, error = %e, "Control frame not sent");
        }
    }

    #[must_use]
    pub fn is_subscribed(&self, room: &str) -> bool {
        self.inner.state.lock().rooms.contains(room)
    }

    /// Current desired room set, in no particular order
    #[must_use]
    pub fn desired_rooms(&self) -> Vec<String> {
        self.inner.state.lock().rooms.snapshot()
    }

    // === Outbound ===

    /// Send a protocol frame now, or queue it until the next connection
    pub fn send(&self, message: &OutboundMessage) -> SendOutcome {
        self.send_json(message)
    }

    /// Send any serializable application frame
    pub fn send_json<T: Serialize + ?Sized>(&self, message: &T) -> SendOutcome {
        if !self.enabled() {
            return SendOutcome::Rejected;
        }
        let frame = match serde_json::to_string(message) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(client_id = %self.inner.id, error = %e, "Failed to encode outbound frame");
                return SendOutcome::Rejected;
            }
        };
        self.send_frame(frame)
    }

    fn send_frame(&self, frame: String) -> SendOutcome {
        let mut st = self.inner.state.lock();
        if !st.authenticated {
            tracing::debug!(client_id = %self.inner.id, "Send ignored, not authenticated");
            st.record_error(ClientError::Unauthenticated);
            return SendOutcome::Rejected;
        }

        if st.connection.is_connected() && st.transmit(&frame).is_ok() {
            return SendOutcome::Sent;
        }

        let dropped = st.enqueue(frame);
        if dropped > 0 {
            tracing::warn!(
                client_id = %self.inner.id,
                dropped,
                queued = st.queue.len(),
                capacity = st.queue.capacity(),
                "Outbound queue full, dropped oldest frames"
            );
        }
        SendOutcome::Queued { dropped }
    }

    // === Inbound ===

    /// Register a handler for every non-heartbeat frame
    pub fn register_handler(&self, handler: impl MessageHandler) -> HandlerGuard {
        self.inner.dispatcher.register(handler)
    }

    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.inner.dispatcher.handler_count()
    }

    // === Introspection ===

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.state.lock().connection
    }

    /// Watch connection state changes
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    #[must_use]
    pub fn stats(&self) -> ClientStats {
        self.inner.state.lock().stats
    }

    /// Most recent fault observed, for diagnostics
    #[must_use]
    pub fn last_error(&self) -> Option<ClientError> {
        self.inner.state.lock().last_error.clone()
    }

    #[must_use]
    pub fn queued_frames(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    /// Failed attempts since the last successful connection
    #[must_use]
    pub fn retry_attempt(&self) -> u32 {
        self.inner.state.lock().attempt
    }

    #[must_use]
    pub fn reconnect_pending(&self) -> bool {
        self.inner.state.lock().reconnect_timer.is_some()
    }

    /// Time since the last frame was received and dispatched
    ///
    /// `None` until the first frame arrives.
    #[must_use]
    pub fn time_since_last_inbound(&self) -> Option<Duration> {
        let last = self.inner.state.lock().last_inbound_ms?;
        Some(Duration::from_millis(
            self.inner.clock.now_ms().saturating_sub(last),
        ))
    }
}

impl std::fmt::Debug for RealtimeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.inner.state.lock();
        f.debug_struct("RealtimeClient")
            .field("id", &self.inner.id)
            .field("state", &st.connection)
            .field("rooms", &st.rooms.len())
            .field("queued", &st.queue.len())
            .finish()
    }
}

/// Builder for [`RealtimeClient`]
pub struct RealtimeClientBuilder {
    config: RealtimeConfig,
    transport: Option<Arc<dyn Transport>>,
    clock: Option<Arc<dyn Clock>>,
    jitter_seed: Option<u64>,
    authenticated: bool,
}

impl RealtimeClientBuilder {
    #[must_use]
    pub fn new(config: RealtimeConfig) -> Self {
        Self {
            config,
            transport: None,
            clock: None,
            jitter_seed: None,
            authenticated: false,
        }
    }

    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Seed the jitter generator for reproducible reconnect delays
    #[must_use]
    pub fn jitter_seed(mut self, seed: u64) -> Self {
        self.jitter_seed = Some(seed);
        self
    }

    /// Start with an authenticated session
    #[must_use]
    pub fn authenticated(mut self, authenticated: bool) -> Self {
        self.authenticated = authenticated;
        self
    }

    /// Validate the configuration and build the client
    ///
    /// Defaults to [`WebSocketTransport`] and a [`TokioClock`] on the current
    /// runtime.
    pub fn build(self) -> ClientResult<RealtimeClient> {
        self.config.validate()?;

        let clock = match self.clock {
            Some(clock) => clock,
            None => Arc::new(
                TokioClock::try_current().map_err(|e| ClientError::Config(e.to_string()))?,
            ),
        };
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(WebSocketTransport::new()));
        let rng = self
            .jitter_seed
            .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);

        Ok(RealtimeClient::from_parts(
            self.config,
            transport,
            clock,
            rng,
            self.authenticated,
        ))
    }
}
