//! Reconciliation tests
//!
//! Pushed frames travel through the real client and dispatcher into the
//! reconcilers.
//!
//! Run with: cargo test -p integration-tests --test reconcile_tests

use std::collections::HashMap;
use std::time::Duration;

use circle_realtime::protocol::CircleMessage;
use circle_realtime::reconcile::{
    MessageReconciler, ReadHorizonReconciler, TypingTracker, UnreadCounters, ViewCache,
};
use circle_realtime::time::Clock;
use integration_tests::*;

fn snapshot(total: u64, rooms: &[(&str, u64)]) -> UnreadCounters {
    UnreadCounters::from_snapshot(
        total,
        rooms
            .iter()
            .map(|(room, n)| ((*room).to_string(), *n))
            .collect::<HashMap<_, _>>(),
    )
}

// ============================================================================
// Message append
// ============================================================================

#[test]
fn test_redelivered_message_applied_once() {
    let h = Harness::new();
    let cache = ViewCache::new();
    let messages = MessageReconciler::new(h.client.clone(), cache.clone());
    messages.start();

    let link = h.connect_and_open();
    let id = message_id();
    link.push(&new_message_frame("c1", &id, at(10)));
    link.push(&new_message_frame("c1", &id, at(10)));

    assert_eq!(cache.message_count("c1"), 1);
    assert_eq!(cache.unread_for("c1"), 1);
    assert_eq!(cache.unread_total(), 1);
}

#[test]
fn test_active_circle_gets_messages_without_unread() {
    let h = Harness::new();
    let cache = ViewCache::new();
    let messages = MessageReconciler::new(h.client.clone(), cache.clone());
    messages.start();
    messages.view_circle(Some("c1"));

    let link = h.connect_and_open();
    link.push(&new_message_frame("c1", &message_id(), at(10)));
    link.push(&new_message_frame("c2", &message_id(), at(11)));

    assert_eq!(cache.message_count("c1"), 1);
    assert_eq!(cache.unread_for("c1"), 0);
    assert_eq!(cache.unread_for("c2"), 1);
}

#[test]
fn test_redelivery_after_switching_circles_applied_once() {
    let h = Harness::new();
    let cache = ViewCache::new();
    let messages = MessageReconciler::new(h.client.clone(), cache.clone());
    messages.start();
    messages.view_circle(Some("c2"));

    let link = h.connect_and_open();
    let id = message_id();
    link.push(&new_message_frame("c1", &id, at(10)));
    messages.view_circle(Some("c3"));

    // The server replays the backlog after a reconnect
    link.drop_connection();
    h.fire_next_timer();
    let link = h.transport.last();
    link.open();
    link.push(&new_message_frame("c1", &id, at(10)));

    assert_eq!(cache.message_count("c1"), 1);
    assert_eq!(cache.unread_for("c1"), 1);
    assert_eq!(cache.unread_total(), 1);
}

#[test]
fn test_history_then_push_of_same_message() {
    let h = Harness::new();
    let cache = ViewCache::new();
    let messages = MessageReconciler::new(h.client.clone(), cache.clone());
    messages.start();

    let id = message_id();
    messages.load_history(
        "c1",
        vec![
            CircleMessage::new(&id, at(5)),
            CircleMessage::new(message_id(), at(1)),
        ],
    );

    let link = h.connect_and_open();
    link.push(&new_message_frame("c1", &id, at(5)));

    let list = cache.messages("c1");
    assert_eq!(list.len(), 2);
    assert!(list[0].created_at < list[1].created_at);
    assert_eq!(cache.unread_total(), 0);
}

#[test]
fn test_stopped_reconciler_ignores_pushes() {
    let h = Harness::new();
    let cache = ViewCache::new();
    let messages = MessageReconciler::new(h.client.clone(), cache.clone());
    messages.start();
    messages.stop();
    assert_eq!(h.client.handler_count(), 0);

    let link = h.connect_and_open();
    link.push(&new_message_frame("c1", &message_id(), at(1)));
    assert_eq!(cache.message_count("c1"), 0);
}

// ============================================================================
// Read horizon
// ============================================================================

#[test]
fn test_read_horizon_clears_exactly_one_circle() {
    let h = Harness::new();
    let cache = ViewCache::new();
    cache.refresh_unread(snapshot(9, &[("c1", 4), ("c2", 5)]));
    let horizons = ReadHorizonReconciler::new(h.client.clone(), cache.clone());
    horizons.start();

    let link = h.connect_and_open();
    link.push(&read_horizon_frame("c1", at(100)));

    assert_eq!(cache.unread_for("c1"), 0);
    assert_eq!(cache.unread_for("c2"), 5);
    assert_eq!(cache.unread_total(), 5);
}

#[test]
fn test_read_horizon_never_negative() {
    let h = Harness::new();
    let cache = ViewCache::new();
    cache.refresh_unread(snapshot(2, &[("c1", 3), ("c2", 3)]));
    let horizons = ReadHorizonReconciler::new(h.client.clone(), cache.clone());
    horizons.start();

    let link = h.connect_and_open();
    link.push(&read_horizon_frame("c1", at(100)));
    link.push(&read_horizon_frame("c2", at(100)));
    link.push(&read_horizon_frame("c2", at(200)));

    assert_eq!(cache.unread_total(), 0);
}

#[test]
fn test_older_horizon_is_ignored() {
    let h = Harness::new();
    let cache = ViewCache::new();
    let messages = MessageReconciler::new(h.client.clone(), cache.clone());
    let horizons = ReadHorizonReconciler::new(h.client.clone(), cache.clone());
    messages.start();
    horizons.start();

    let link = h.connect_and_open();
    link.push(&read_horizon_frame("c1", at(100)));
    link.push(&new_message_frame("c1", &message_id(), at(150)));
    link.push(&read_horizon_frame("c1", at(50)));

    assert_eq!(cache.read_horizon("c1"), Some(at(100)));
    assert_eq!(cache.unread_for("c1"), 1);

    // A message older than the horizon arrives late: listed, not counted
    link.push(&new_message_frame("c1", &message_id(), at(90)));
    assert_eq!(cache.message_count("c1"), 2);
    assert_eq!(cache.unread_for("c1"), 1);
}

#[test]
fn test_local_mark_read() {
    let h = Harness::new();
    let cache = ViewCache::new();
    cache.refresh_unread(snapshot(3, &[("c1", 3)]));
    let horizons = ReadHorizonReconciler::new(h.client.clone(), cache.clone());

    assert_eq!(horizons.apply_local("c1", at(10)), Some(3));
    assert_eq!(horizons.apply_local("c1", at(10)), None);
    assert_eq!(cache.unread_total(), 0);
}

// ============================================================================
// Typing
// ============================================================================

#[test]
fn test_typing_visible_for_ttl() {
    let h = Harness::new();
    let tracker = TypingTracker::with_local_user(h.client.clone(), "me");
    tracker.activate("c1");

    let link = h.connect_and_open();
    h.clock.advance(Duration::from_millis(250));
    let t = h.clock.now_ms();
    link.push(&typing_frame("c1", "u1", true));

    h.clock.advance(Duration::from_millis(5_999));
    assert_eq!(h.clock.now_ms(), t + 5_999);
    assert_eq!(tracker.typing_users(), vec!["u1"]);

    h.clock.advance(Duration::from_millis(1));
    assert!(tracker.typing_users().is_empty());
}

#[test]
fn test_typing_restamped_and_stopped() {
    let h = Harness::new();
    let tracker = TypingTracker::new(h.client.clone());
    tracker.activate("c1");
    let link = h.connect_and_open();

    link.push(&typing_frame("c1", "u1", true));
    h.clock.advance(Duration::from_secs(5));
    link.push(&typing_frame("c1", "u1", true));
    h.clock.advance(Duration::from_secs(5));
    assert!(tracker.is_typing("u1"));

    link.push(&typing_frame("c1", "u1", false));
    assert!(!tracker.is_typing("u1"));
}

#[test]
fn test_typing_in_other_circle_and_own_echo_ignored() {
    let h = Harness::new();
    let tracker = TypingTracker::with_local_user(h.client.clone(), "me");
    tracker.activate("c1");
    let link = h.connect_and_open();

    link.push(&typing_frame("c2", "u1", true));
    link.push(&typing_frame("c1", "me", true));
    assert!(tracker.typing_users().is_empty());
}

#[test]
fn test_typing_scope_subscribes_and_releases() {
    let h = Harness::new();
    let link = h.connect_and_open();
    let tracker = TypingTracker::new(h.client.clone());

    tracker.activate("c1");
    tracker.activate("c2");
    tracker.deactivate();

    assert_eq!(
        link.sent(),
        vec![
            subscribe_frame("circle:c1"),
            unsubscribe_frame("circle:c1"),
            subscribe_frame("circle:c2"),
            unsubscribe_frame("circle:c2"),
        ]
    );
    assert_eq!(h.client.handler_count(), 0);
    assert_eq!(h.clock.pending_timers(), 0);
}

#[test]
fn test_typing_notice_throttled() {
    let h = Harness::new();
    let link = h.connect_and_open();
    let tracker = TypingTracker::new(h.client.clone());
    tracker.activate("c1");

    for _ in 0..5 {
        tracker.notify_typing(true);
        h.clock.advance(Duration::from_millis(500));
    }
    tracker.notify_typing(false);
    h.clock.advance(Duration::from_millis(500));
    tracker.notify_typing(true);

    let notices: Vec<_> = link
        .sent()
        .into_iter()
        .filter(|f| f["type"] == "circle:typing")
        .collect();
    assert_eq!(
        notices,
        vec![
            typing_notice("c1", true),
            typing_notice("c1", false),
            typing_notice("c1", true),
        ]
    );
}

#[test]
fn test_dropping_tracker_releases_resources() {
    let h = Harness::new();
    {
        let tracker = TypingTracker::new(h.client.clone());
        tracker.activate("c1");
        assert_eq!(h.client.handler_count(), 1);
    }
    assert_eq!(h.client.handler_count(), 0);
    assert_eq!(h.clock.pending_timers(), 0);
    assert!(!h.client.is_subscribed("circle:c1"));
}
