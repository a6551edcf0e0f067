//! # circle-realtime
//!
//! Realtime synchronization client: one resilient WebSocket connection,
//! room subscriptions that survive reconnects, a bounded outbound queue, and
//! reconcilers that fold pushed events into cached view state.

pub mod connection;
pub mod dispatch;
pub mod protocol;
pub mod reconcile;
pub mod subscription;
pub mod time;

pub use connection::{ConnectionState, RealtimeClient, SendOutcome, WebSocketTransport};
pub use dispatch::{HandlerGuard, HandlerResult};
pub use protocol::{InboundMessage, OutboundMessage};

use circle_common::AppConfig;
use std::sync::Arc;
use time::TokioClock;

/// Connect with the given configuration, join `rooms`, and log inbound
/// frames until Ctrl-C
///
/// # Errors
/// Returns an error if the configuration is invalid or the shutdown signal
/// cannot be installed.
pub async fn run(config: AppConfig, rooms: Vec<String>) -> anyhow::Result<()> {
    let client = RealtimeClient::builder(config.realtime)
        .transport(Arc::new(WebSocketTransport::new()))
        .clock(Arc::new(TokioClock::new()))
        .authenticated(true)
        .build()?;

    let _logger = client.register_handler(|message: &InboundMessage| -> HandlerResult<()> {
        tracing::info!(frame_type = %message.kind(), circle_id = ?message.circle_id(), "Inbound frame");
        Ok(())
    });

    let mut states = client.watch_state();
    let client_id = client.id();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = *states.borrow_and_update();
            tracing::info!(client_id = %client_id, state = %state, "State");
        }
    });

    client.connect();
    for room in &rooms {
        client.subscribe(room);
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!(client_id = %client.id(), stats = ?client.stats(), "Shutting down");
    client.disconnect();

    Ok(())
}
