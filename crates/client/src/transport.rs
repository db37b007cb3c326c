//! Transport actor. Owns one gateway connection for one session.
//!
//! Each transport runs as an independent tokio task that feeds every input
//! (commands, connection traffic, timer expiry) through `transition()` one at
//! a time and executes the resulting effects. External callers talk to it via
//! `TransportHandle`. Lock-free state reads go through `ArcSwap`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use shellgate_protocol::{encode, HostConfig, TerminalSize};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::config::EndpointProvider;
use crate::connection::{Connection, ConnectionEvent, ConnectionMessage, Dialer};
use crate::event::{TransportEvent, TransportEventKind};
use crate::session::SessionId;
use crate::surface::TerminalSurface;
use crate::transition::{
    transition, ConnectionId, Effect, Input, Timer, TimerKind, TransitionState, TransportConfig,
    TransportState,
};

/// Everything a transport needs besides its host and surface. Cheap to clone.
#[derive(Clone)]
pub struct TransportContext {
    pub dialer: Arc<dyn Dialer>,
    pub endpoint: Arc<dyn EndpointProvider>,
    pub events: mpsc::UnboundedSender<TransportEvent>,
    pub config: TransportConfig,
}

enum TransportCommand {
    Input(String),
    Resize(TerminalSize),
    Close { reply: Option<oneshot::Sender<()>> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportSnapshot {
    pub state: TransportState,
    pub reconnect_attempts: u32,
}

/// Handle to a running transport (cheap to Clone).
#[derive(Clone)]
pub struct TransportHandle {
    session_id: SessionId,
    command_tx: mpsc::UnboundedSender<TransportCommand>,
    snapshot: Arc<ArcSwap<TransportSnapshot>>,
    closed: Arc<AtomicBool>,
}

impl TransportHandle {
    /// Spawn the transport and open it immediately.
    pub fn spawn<S: TerminalSurface>(
        session_id: SessionId,
        host: HostConfig,
        surface: S,
        ctx: &TransportContext,
    ) -> TransportHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (conn_tx, conn_rx) = mpsc::unbounded_channel();
        let initial = TransportSnapshot {
            state: TransportState::Idle,
            reconnect_attempts: 0,
        };
        let snapshot = Arc::new(ArcSwap::from_pointee(initial));
        let closed = Arc::new(AtomicBool::new(false));

        let actor = TransportActor {
            session_id: session_id.clone(),
            host_name: host.name.clone(),
            machine: Some(TransitionState::new(host, ctx.config, surface.size())),
            surface,
            dialer: Arc::clone(&ctx.dialer),
            endpoint: Arc::clone(&ctx.endpoint),
            events: ctx.events.clone(),
            connection: None,
            timers: HashMap::new(),
            conn_tx,
            conn_rx,
            command_rx,
            snapshot: Arc::clone(&snapshot),
            closed: Arc::clone(&closed),
        };
        tokio::spawn(actor.run());

        TransportHandle {
            session_id,
            command_tx,
            snapshot,
            closed,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Forward a keystroke/paste from the surface.
    pub fn input(&self, data: impl Into<String>) {
        self.send(TransportCommand::Input(data.into()));
    }

    /// Report a new surface size.
    pub fn resize(&self, size: TerminalSize) {
        self.send(TransportCommand::Resize(size));
    }

    /// Close the transport. Nothing is emitted or written for this session
    /// once this returns. Returns false if it was already closed.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.send(TransportCommand::Close { reply: None });
        true
    }

    /// Close and wait until timers are cancelled and the connection dropped.
    pub async fn close_and_wait(&self) {
        let first = !self.closed.swap(true, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        if self
            .command_tx
            .send(TransportCommand::Close { reply: Some(tx) })
            .is_ok()
        {
            let _ = rx.await;
        } else if first {
            debug!(
                component = "transport",
                event = "transport.close.actor_gone",
                session_id = %self.session_id,
                "Transport task already finished"
            );
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Lock-free snapshot read.
    pub fn snapshot(&self) -> TransportSnapshot {
        **self.snapshot.load()
    }

    fn send(&self, cmd: TransportCommand) {
        if self.command_tx.send(cmd).is_err() {
            debug!(
                component = "transport",
                session_id = %self.session_id,
                "Transport task finished, command dropped"
            );
        }
    }
}

struct TransportActor<S> {
    session_id: SessionId,
    host_name: String,
    machine: Option<TransitionState>,
    surface: S,
    dialer: Arc<dyn Dialer>,
    endpoint: Arc<dyn EndpointProvider>,
    events: mpsc::UnboundedSender<TransportEvent>,
    connection: Option<(ConnectionId, Connection)>,
    timers: HashMap<TimerKind, (Timer, Instant)>,
    conn_tx: mpsc::UnboundedSender<ConnectionMessage>,
    conn_rx: mpsc::UnboundedReceiver<ConnectionMessage>,
    command_rx: mpsc::UnboundedReceiver<TransportCommand>,
    snapshot: Arc<ArcSwap<TransportSnapshot>>,
    closed: Arc<AtomicBool>,
}

impl<S: TerminalSurface> TransportActor<S> {
    async fn run(mut self) {
        info!(
            component = "transport",
            event = "transport.started",
            session_id = %self.session_id,
            host = %self.host_name,
            "Transport started"
        );

        self.apply(Input::Open);

        while !self.is_closed_state() {
            let next_timer = self.next_timer();
            let deadline = next_timer
                .map(|(_, at)| at)
                .unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

            tokio::select! {
                cmd = self.command_rx.recv() => match cmd {
                    Some(TransportCommand::Input(data)) => self.apply(Input::TerminalInput(data)),
                    Some(TransportCommand::Resize(size)) => self.apply(Input::TerminalResize(size)),
                    Some(TransportCommand::Close { reply }) => {
                        self.apply(Input::Close);
                        if let Some(reply) = reply {
                            let _ = reply.send(());
                        }
                    }
                    // Every handle dropped: nobody can observe us any more.
                    None => self.apply(Input::Close),
                },

                Some(msg) = self.conn_rx.recv() => {
                    let input = match msg.event {
                        ConnectionEvent::Opened => Input::ConnectionOpened(msg.conn),
                        ConnectionEvent::Frame(text) => Input::FrameReceived { conn: msg.conn, text },
                        ConnectionEvent::Closed(reason) => Input::ConnectionClosed { conn: msg.conn, reason },
                    };
                    self.apply(input);
                }

                _ = sleep_until(deadline), if next_timer.is_some() => {
                    if let Some((timer, _)) = next_timer {
                        self.timers.remove(&timer.kind());
                        self.apply(Input::TimerFired(timer));
                    }
                }
            }
        }

        info!(
            component = "transport",
            event = "transport.stopped",
            session_id = %self.session_id,
            "Transport stopped"
        );
    }

    fn is_closed_state(&self) -> bool {
        self.machine
            .as_ref()
            .map_or(true, |m| m.state == TransportState::Closed)
    }

    fn next_timer(&self) -> Option<(Timer, Instant)> {
        self.timers.values().min_by_key(|(_, at)| *at).copied()
    }

    fn apply(&mut self, input: Input) {
        let Some(machine) = self.machine.take() else {
            return;
        };
        let before = machine.state;
        let (machine, effects) = transition(machine, input);
        let after = machine.state;
        self.snapshot.store(Arc::new(TransportSnapshot {
            state: after,
            reconnect_attempts: machine.reconnect_attempts,
        }));
        self.machine = Some(machine);

        if before != after {
            debug!(
                component = "transport",
                event = "transport.state.changed",
                session_id = %self.session_id,
                from = ?before,
                to = ?after,
                "Transport state changed"
            );
        }

        for effect in effects {
            self.execute(effect);
        }
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::Dial(conn) => self.dial(conn),

            Effect::Send { conn, frame } => {
                let Some((live, connection)) = &self.connection else {
                    return;
                };
                if *live != conn {
                    return;
                }
                match encode(&frame) {
                    Ok(text) => {
                        if !connection.send(text) {
                            debug!(
                                component = "transport",
                                event = "transport.send.dropped",
                                session_id = %self.session_id,
                                frame_type = %frame.frame_type(),
                                "Connection task gone, frame dropped"
                            );
                        }
                    }
                    Err(e) => warn!(
                        component = "transport",
                        event = "transport.send.encode_failed",
                        session_id = %self.session_id,
                        error = %e,
                        "Failed to encode frame"
                    ),
                }
            }

            Effect::Disconnect(conn) => {
                if matches!(&self.connection, Some((live, _)) if *live == conn) {
                    self.connection = None;
                }
            }

            Effect::Schedule { timer, after } => {
                self.timers
                    .insert(timer.kind(), (timer, Instant::now() + after));
            }

            Effect::Cancel(kind) => {
                self.timers.remove(&kind);
            }

            Effect::Write(data) => {
                if !self.closed.load(Ordering::SeqCst) {
                    self.surface.write(&data);
                }
            }

            Effect::Emit(kind) => self.emit(kind),
        }
    }

    fn dial(&mut self, conn: ConnectionId) {
        // At most one live connection.
        self.connection = None;

        match self.endpoint.endpoint() {
            Ok(endpoint) => {
                let connection = self.dialer.dial(endpoint, conn, self.conn_tx.clone());
                self.connection = Some((conn, connection));
            }
            Err(e) => {
                warn!(
                    component = "transport",
                    event = "transport.endpoint.unavailable",
                    session_id = %self.session_id,
                    error = %e,
                    "No gateway endpoint, not dialing"
                );
                self.apply(Input::EndpointUnavailable {
                    conn,
                    message: e.to_string(),
                });
            }
        }
    }

    fn emit(&self, kind: TransportEventKind) {
        match &kind {
            TransportEventKind::Debug { message } => debug!(
                component = "transport",
                event = "transport.debug",
                session_id = %self.session_id,
                "{message}"
            ),
            TransportEventKind::Error { kind: error_kind, message } => warn!(
                component = "transport",
                event = "transport.error",
                session_id = %self.session_id,
                error_kind = ?error_kind,
                error = %message,
                "Transport error"
            ),
            other => info!(
                component = "transport",
                event = "transport.lifecycle",
                session_id = %self.session_id,
                lifecycle = ?other,
                "Transport lifecycle event"
            ),
        }

        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let _ = self.events.send(TransportEvent {
            session_id: self.session_id.clone(),
            host_name: self.host_name.clone(),
            kind,
        });
    }
}
