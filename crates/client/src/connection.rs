//! Underlying gateway connections
//!
//! A `Dialer` turns an endpoint into a running connection task. Everything the
//! task observes is reported on a shared channel tagged with the
//! `ConnectionId` it was dialed for, so the transport can tell a live
//! connection from a superseded one.

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};

use crate::transition::ConnectionId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Opened,
    Frame(String),
    Closed(Option<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionMessage {
    pub conn: ConnectionId,
    pub event: ConnectionEvent,
}

/// Owner side of one connection. Dropping it tears the connection down
/// without reporting anything further.
pub struct Connection {
    outbound: mpsc::UnboundedSender<String>,
    task: Option<JoinHandle<()>>,
}

impl Connection {
    pub fn new(outbound: mpsc::UnboundedSender<String>, task: Option<JoinHandle<()>>) -> Self {
        Self { outbound, task }
    }

    /// Queue one text frame. Returns false once the connection is gone.
    pub fn send(&self, text: String) -> bool {
        self.outbound.send(text).is_ok()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

pub trait Dialer: Send + Sync + 'static {
    fn dial(
        &self,
        endpoint: String,
        conn: ConnectionId,
        events: mpsc::UnboundedSender<ConnectionMessage>,
    ) -> Connection;
}

/// Dials the gateway over WebSocket (`ws://` or `wss://`).
#[derive(Debug, Clone, Default)]
pub struct WebSocketDialer;

impl Dialer for WebSocketDialer {
    fn dial(
        &self,
        endpoint: String,
        conn: ConnectionId,
        events: mpsc::UnboundedSender<ConnectionMessage>,
    ) -> Connection {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_websocket(endpoint, conn, outbound_rx, events));
        Connection::new(outbound_tx, Some(task))
    }
}

async fn run_websocket(
    endpoint: String,
    conn: ConnectionId,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<ConnectionMessage>,
) {
    let report = |event| {
        let _ = events.send(ConnectionMessage { conn, event });
    };

    debug!(
        component = "connection",
        event = "ws.connect.start",
        connection_id = conn.get(),
        endpoint = %endpoint,
        "Dialing gateway"
    );

    let socket = match connect_async(endpoint.as_str()).await {
        Ok((socket, _response)) => socket,
        Err(e) => {
            warn!(
                component = "connection",
                event = "ws.connect.failed",
                connection_id = conn.get(),
                error = %e,
                "Gateway connection failed"
            );
            report(ConnectionEvent::Closed(Some(e.to_string())));
            return;
        }
    };

    report(ConnectionEvent::Opened);
    let (mut ws_tx, mut ws_rx) = socket.split();

    let reason = loop {
        tokio::select! {
            outgoing = outbound_rx.recv() => {
                let Some(text) = outgoing else {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break Some("connection released".to_string());
                };
                if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                    break Some(e.to_string());
                }
            }
            incoming = ws_rx.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    report(ConnectionEvent::Frame(text.as_str().to_owned()));
                }
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => report(ConnectionEvent::Frame(text)),
                    Err(_) => debug!(
                        component = "connection",
                        event = "ws.message.non_utf8",
                        connection_id = conn.get(),
                        payload_bytes = data.len(),
                        "Dropping non-UTF-8 binary message"
                    ),
                },
                Some(Ok(Message::Close(frame))) => {
                    break frame.map(|f| f.reason.as_str().to_owned()).filter(|r| !r.is_empty());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => break Some(e.to_string()),
                None => break None,
            }
        }
    };

    debug!(
        component = "connection",
        event = "ws.connection.closed",
        connection_id = conn.get(),
        reason = ?reason,
        "Gateway connection closed"
    );
    report(ConnectionEvent::Closed(reason));
}
