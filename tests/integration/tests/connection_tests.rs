//! Connection lifecycle tests
//!
//! Drive the client through the in-memory transport on a virtual clock.
//!
//! Run with: cargo test -p integration-tests --test connection_tests

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use circle_common::{ClientError, RealtimeConfig};
use circle_realtime::connection::{Backoff, ConnectionState, SendOutcome};
use circle_realtime::dispatch::{HandlerError, HandlerResult};
use circle_realtime::protocol::{InboundMessage, OutboundMessage};
use integration_tests::*;
use parking_lot::Mutex;
use serde_json::Value;

// ============================================================================
// Backoff
// ============================================================================

#[test]
fn test_backoff_is_monotonic_and_capped() {
    let backoff = Backoff::new(
        Duration::from_secs(1),
        Duration::from_secs(30),
        Duration::ZERO,
    );

    let mut previous = Duration::ZERO;
    for attempt in 0..64 {
        let delay = backoff.base_delay(attempt);
        assert!(delay >= previous, "attempt {attempt} went down");
        assert!(delay <= Duration::from_secs(30));
        previous = delay;
    }
    assert_eq!(backoff.base_delay(0), Duration::from_secs(1));
    assert_eq!(backoff.base_delay(4), Duration::from_secs(16));
    assert_eq!(backoff.base_delay(5), Duration::from_secs(30));
}

#[test]
fn test_reconnect_delays_follow_backoff() {
    let h = Harness::new();
    h.transport.refuse_opens(true);
    h.client.connect();

    let delays: Vec<u64> = (0..7)
        .map(|_| h.fire_next_timer().map_or(0, |d| d.as_secs()))
        .collect();
    assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30]);
    assert_eq!(h.client.retry_attempt(), 8);
}

#[test]
fn test_jitter_stays_within_bound() {
    let config = RealtimeConfig {
        backoff_jitter_ms: 1_000,
        ..RealtimeConfig::default()
    };
    let h = Harness::with_config(config);
    h.transport.refuse_opens(true);
    h.client.connect();

    for attempt in 0..10u32 {
        let base = Duration::from_millis((1_000u64 << attempt).min(30_000));
        let delay = h.fire_next_timer().expect("reconnect scheduled");
        assert!(delay >= base && delay < base + Duration::from_secs(1));
    }
}

// ============================================================================
// Connect / disconnect
// ============================================================================

#[test]
fn test_successful_open_resets_retry_counter() {
    let h = Harness::new();
    h.client.connect();
    h.transport.last().drop_connection();
    h.fire_next_timer();
    h.transport.last().drop_connection();
    assert_eq!(h.client.retry_attempt(), 2);

    h.fire_next_timer();
    h.transport.last().open();
    assert_eq!(h.client.state(), ConnectionState::Connected);
    assert_eq!(h.client.retry_attempt(), 0);
    assert!(!h.client.reconnect_pending());
}

#[test]
fn test_server_close_triggers_reconnect() {
    let h = Harness::new();
    let link = h.connect_and_open();

    link.close_from_server();
    assert_eq!(h.client.state(), ConnectionState::Disconnected);
    assert!(h.client.reconnect_pending());

    assert_eq!(h.fire_next_timer(), Some(Duration::from_secs(1)));
    assert_eq!(h.transport.open_count(), 2);
    assert_eq!(h.client.state(), ConnectionState::Connecting);
}

#[test]
fn test_intentional_close_never_reconnects() {
    let h = Harness::new();
    let link = h.connect_and_open();

    h.client.disconnect();
    assert!(link.is_closed());
    // The transport reports the close it was asked for
    link.close_from_server();
    link.drop_connection();

    h.clock.advance(Duration::from_secs(600));
    assert_eq!(h.transport.open_count(), 1);
    assert_eq!(h.client.state(), ConnectionState::Disconnected);
    assert_eq!(h.clock.pending_timers(), 0);
}

#[test]
fn test_disconnect_cancels_pending_reconnect() {
    let h = Harness::new();
    h.client.connect();
    h.transport.last().drop_connection();
    assert!(h.client.reconnect_pending());

    h.client.disconnect();
    assert!(!h.client.reconnect_pending());
    assert_eq!(h.clock.pending_timers(), 0);

    h.clock.advance(Duration::from_secs(600));
    assert_eq!(h.transport.open_count(), 1);
}

#[test]
fn test_disconnect_is_idempotent_and_forgets_intent() {
    let h = Harness::new();
    h.client.subscribe("circle:1");
    h.client.send_json(&app_frame(1));

    h.client.disconnect();
    h.client.disconnect();
    assert!(h.client.desired_rooms().is_empty());
    assert_eq!(h.client.queued_frames(), 0);

    // An explicit connect starts over from scratch
    let link = h.connect_and_open();
    assert!(link.sent().is_empty());
}

// ============================================================================
// Room registry
// ============================================================================

#[test]
fn test_subscribe_while_connected_sends_immediately() {
    let h = Harness::new();
    let link = h.connect_and_open();

    h.client.subscribe("circle:1");
    h.client.subscribe("circle:1");
    assert_eq!(link.sent(), vec![subscribe_frame("circle:1")]);

    h.client.unsubscribe("circle:1");
    h.client.unsubscribe("circle:1");
    assert_eq!(
        link.sent(),
        vec![subscribe_frame("circle:1"), unsubscribe_frame("circle:1")]
    );
}

#[test]
fn test_subscribe_while_disconnected_only_records() {
    let h = Harness::new();
    h.client.subscribe("circle:1");
    assert!(h.client.is_subscribed("circle:1"));
    assert_eq!(h.client.queued_frames(), 0);
}

#[test]
fn test_resubscribe_after_failed_attempts() {
    let h = Harness::new();
    let rooms = ["circle:1", "circle:2", "user:9"];
    for room in rooms {
        h.client.subscribe(room);
    }

    h.client.connect();
    for _ in 0..4 {
        h.transport.last().drop_connection();
        h.fire_next_timer();
    }
    h.client.unsubscribe("user:9");

    let link = h.transport.last();
    link.open();

    let sent = link.sent();
    assert!(sent.iter().all(|f| f["type"] == "subscribe"));
    let joined: BTreeSet<&str> = sent.iter().filter_map(|f| f["room"].as_str()).collect();
    assert_eq!(joined, BTreeSet::from(["circle:1", "circle:2"]));
    assert_eq!(sent.len(), 2);
}

// ============================================================================
// Outbound queue
// ============================================================================

#[test]
fn test_queue_flushes_in_order_after_subscriptions() {
    let h = Harness::new();
    h.client.subscribe("circle:1");
    for n in 0..3 {
        assert_eq!(
            h.client.send_json(&app_frame(n)),
            SendOutcome::Queued { dropped: 0 }
        );
    }

    let link = h.connect_and_open();
    assert_eq!(
        link.sent(),
        vec![
            subscribe_frame("circle:1"),
            app_frame(0),
            app_frame(1),
            app_frame(2)
        ]
    );
    assert_eq!(h.client.queued_frames(), 0);
    assert_eq!(h.client.send_json(&app_frame(3)), SendOutcome::Sent);
}

#[test]
fn test_backpressure_keeps_newest_frames() {
    let config = RealtimeConfig {
        queue_capacity: 10,
        ..test_realtime_config()
    };
    let h = Harness::with_config(config);

    let dropped: usize = (0..15)
        .map(|n| match h.client.send_json(&app_frame(n)) {
            SendOutcome::Queued { dropped } => dropped,
            other => panic!("expected queued, got {other:?}"),
        })
        .sum();
    assert_eq!(dropped, 5);
    assert_eq!(h.client.queued_frames(), 10);
    assert_eq!(h.client.stats().frames_dropped, 5);
    assert_eq!(h.client.last_error(), Some(ClientError::Backpressure(1)));

    let link = h.connect_and_open();
    let expected: Vec<Value> = (5..15).map(app_frame).collect();
    assert_eq!(link.sent(), expected);
}

#[test]
fn test_interrupted_flush_requeues_remainder() {
    let h = Harness::new();
    for n in 0..4 {
        h.client.send_json(&app_frame(n));
    }

    h.client.connect();
    let first = h.transport.last();
    first.fail_after(2);
    first.open();
    assert_eq!(first.sent(), vec![app_frame(0), app_frame(1)]);
    assert_eq!(h.client.queued_frames(), 2);

    first.drop_connection();
    h.fire_next_timer();
    let second = h.transport.last();
    second.open();
    assert_eq!(second.sent(), vec![app_frame(2), app_frame(3)]);
}

#[test]
fn test_typed_outbound_message() {
    let h = Harness::new();
    let link = h.connect_and_open();
    assert_eq!(
        h.client.send(&OutboundMessage::typing("c1", true)),
        SendOutcome::Sent
    );
    assert_eq!(link.sent(), vec![typing_notice("c1", true)]);
}

// ============================================================================
// Inbound
// ============================================================================

#[test]
fn test_ping_answered_and_not_dispatched() {
    let h = Harness::new();
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    let _guard = h
        .client
        .register_handler(move |_: &InboundMessage| -> HandlerResult<()> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

    let link = h.connect_and_open();
    link.push(&ping_frame());

    assert_eq!(link.sent(), vec![pong_frame()]);
    assert_eq!(seen.load(Ordering::SeqCst), 0);
    assert_eq!(h.client.stats().frames_queued, 0);
}

#[test]
fn test_frames_dispatched_in_receipt_order() {
    let h = Harness::new();
    let order = Arc::new(Mutex::new(Vec::new()));
    let sink = order.clone();
    let _guard = h
        .client
        .register_handler(move |m: &InboundMessage| -> HandlerResult<()> {
            if let InboundMessage::Typing(e) = m {
                sink.lock().push(e.user_id.clone());
            }
            Ok(())
        });

    let link = h.connect_and_open();
    for user in ["a", "b", "c"] {
        link.push(&typing_frame("c1", user, true));
    }
    link.push("not json");

    assert_eq!(*order.lock(), vec!["a", "b", "c"]);
    assert_eq!(h.client.stats().malformed_frames, 1);
    assert_eq!(h.client.stats().frames_received, 4);

    let last = h.client.last_error().expect("malformed frame recorded");
    assert_eq!(last.error_code(), "MALFORMED_FRAME");
    assert!(last.is_recoverable());
}

#[test]
fn test_handler_fault_does_not_stop_others() {
    let h = Harness::new();
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();

    let _bad = h
        .client
        .register_handler(|_: &InboundMessage| -> HandlerResult<()> {
            Err(HandlerError::failed("boom"))
        });
    let _good = h
        .client
        .register_handler(move |_: &InboundMessage| -> HandlerResult<()> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

    let link = h.connect_and_open();
    link.push(&typing_frame("c1", "u1", true));
    link.push(&typing_frame("c1", "u1", false));

    assert_eq!(seen.load(Ordering::SeqCst), 2);
    assert_eq!(h.client.stats().handler_faults, 2);
    assert!(matches!(
        h.client.last_error(),
        Some(ClientError::HandlerFault(_))
    ));
}

#[test]
fn test_frames_from_superseded_connection_ignored() {
    let h = Harness::new();
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    let _guard = h
        .client
        .register_handler(move |_: &InboundMessage| -> HandlerResult<()> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

    let old = h.connect_and_open();
    old.drop_connection();
    h.fire_next_timer();
    let new = h.transport.last();
    new.open();
    assert_ne!(old.generation(), new.generation());

    old.push(&typing_frame("c1", "ghost", true));
    new.push(&typing_frame("c1", "u1", true));
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Gating
// ============================================================================

#[test]
fn test_unauthenticated_client_stays_offline() {
    let h = Harness::unauthenticated();
    h.client.connect();
    h.client.subscribe("circle:1");
    assert_eq!(h.client.send_json(&app_frame(0)), SendOutcome::Rejected);

    assert_eq!(h.transport.open_count(), 0);
    assert!(h.client.desired_rooms().is_empty());
    assert_eq!(h.client.queued_frames(), 0);
}

#[test]
fn test_logout_tears_down() {
    let h = Harness::new();
    h.client.subscribe("circle:1");
    let link = h.connect_and_open();

    h.client.set_authenticated(false);
    assert!(link.is_closed());
    assert_eq!(h.client.state(), ConnectionState::Disconnected);
    assert!(h.client.desired_rooms().is_empty());

    link.drop_connection();
    h.clock.advance(Duration::from_secs(600));
    assert_eq!(h.transport.open_count(), 1);

    h.client.set_authenticated(true);
    h.client.connect();
    assert_eq!(h.transport.open_count(), 2);
}

#[test]
fn test_disabled_client_is_inert() {
    let config = RealtimeConfig {
        enabled: false,
        ..test_realtime_config()
    };
    let h = Harness::with_config(config);

    h.client.connect();
    h.client.subscribe("circle:1");
    h.client.set_authenticated(false);
    assert_eq!(h.client.send_json(&app_frame(0)), SendOutcome::Rejected);

    assert_eq!(h.transport.open_count(), 0);
    assert!(h.client.desired_rooms().is_empty());
    assert!(h.client.is_authenticated());
    assert_eq!(h.client.state(), ConnectionState::Disconnected);
}
