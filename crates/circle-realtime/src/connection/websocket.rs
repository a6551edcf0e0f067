//! WebSocket transport
//!
//! One tokio task per connection owns the socket. Writes reach it through an
//! unbounded channel so `send` never blocks the caller; dropping or closing
//! the connection handle ends the task.

use super::transport::{Transport, TransportConnection, TransportError, TransportEvents};
use futures_util::{SinkExt, StreamExt};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Commands for the socket task
#[derive(Debug)]
enum SocketCommand {
    Text(String),
    Close,
}

/// Transport over `tokio-tungstenite`
#[derive(Debug, Clone, Default)]
pub struct WebSocketTransport {
    runtime: Option<Handle>,
}

impl WebSocketTransport {
    /// Spawn socket tasks on whichever runtime is current at `open` time
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn socket tasks on a specific runtime
    #[must_use]
    pub fn with_handle(runtime: Handle) -> Self {
        Self {
            runtime: Some(runtime),
        }
    }
}

impl Transport for WebSocketTransport {
    fn open(
        &self,
        url: &str,
        events: TransportEvents,
    ) -> Result<Box<dyn TransportConnection>, TransportError> {
        let runtime = match &self.runtime {
            Some(handle) => handle.clone(),
            None => Handle::try_current().map_err(|_| TransportError::NoRuntime)?,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        runtime.spawn(run_socket(url.to_owned(), events, rx));

        Ok(Box::new(WebSocketConnection { tx }))
    }
}

/// Handle to a socket task
struct WebSocketConnection {
    tx: mpsc::UnboundedSender<SocketCommand>,
}

impl TransportConnection for WebSocketConnection {
    fn send(&self, frame: &str) -> Result<(), TransportError> {
        self.tx
            .send(SocketCommand::Text(frame.to_owned()))
            .map_err(|_| TransportError::Closed)
    }

    fn close(&self) {
        let _ = self.tx.send(SocketCommand::Close);
    }
}

/// Socket task: connect, then pump frames both ways until either side ends
async fn run_socket(
    url: String,
    events: TransportEvents,
    mut commands: mpsc::UnboundedReceiver<SocketCommand>,
) {
    let generation = events.generation();

    let (socket, _response) = match connect_async(url.as_str()).await {
        Ok(pair) => pair,
        Err(e) => {
            tracing::debug!(generation, url = %url, error = %e, "WebSocket connect failed");
            events.failed(TransportError::Open(e.to_string()));
            return;
        }
    };

    tracing::debug!(generation, url = %url, "WebSocket connected");
    events.opened();

    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => events.frame(&text),
                Some(Ok(Message::Binary(_))) => {
                    tracing::debug!(generation, "Binary frames not supported, ignoring");
                }
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame.map(|f| f.reason.to_string());
                    tracing::debug!(generation, reason = ?reason, "Server closed connection");
                    events.closed(reason);
                    return;
                }
                // Control frames are answered by tungstenite itself
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(generation, error = %e, "WebSocket read error");
                    events.failed(TransportError::Io(e.to_string()));
                    return;
                }
                None => {
                    events.closed(None);
                    return;
                }
            },

            command = commands.recv() => match command {
                Some(SocketCommand::Text(text)) => {
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        tracing::debug!(generation, error = %e, "WebSocket write error");
                        events.failed(TransportError::Io(e.to_string()));
                        return;
                    }
                }
                Some(SocketCommand::Close) | None => {
                    let _ = sink.close().await;
                    events.closed(Some("closed by client".to_string()));
                    return;
                }
            },
        }
    }
}
