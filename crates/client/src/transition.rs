//! Pure transport state transition
//!
//! All connection lifecycle logic lives here as a pure, synchronous function:
//! `transition(state, input) -> (state, effects)`. Sockets, timers and the
//! terminal surface are driven by the caller from the returned effects.
//!
//! Every input that originates from a connection or a connection-scoped
//! timer carries the `ConnectionId` it belongs to. Anything whose id no
//! longer matches `live` is stale and dropped.

use std::time::Duration;

use shellgate_protocol::{decode, ConnectToHost, Direction, Frame, HostConfig, TerminalSize};

use crate::event::{ErrorKind, TransportEventKind};
use crate::reconnect::{Backoff, ReconnectPolicy};

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Idle,
    Connecting,
    Connected,
    Retrying,
    Failed,
    Closed,
}

impl TransportState {
    /// No further automatic action happens from these states.
    pub fn is_terminal(self) -> bool {
        matches!(self, TransportState::Failed | TransportState::Closed)
    }
}

/// Generation token for one underlying connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn get(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportConfig {
    pub policy: ReconnectPolicy,
    pub connect_timeout: Duration,
    pub keepalive_interval: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            policy: ReconnectPolicy::default(),
            connect_timeout: CONNECT_TIMEOUT,
            keepalive_interval: KEEPALIVE_INTERVAL,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransitionState {
    pub host: HostConfig,
    pub config: TransportConfig,
    pub state: TransportState,
    pub reconnect_attempts: u32,
    /// Last size reported by the surface; sent with every handshake
    pub size: TerminalSize,
    pub live: Option<ConnectionId>,
    generation: u64,
}

impl TransitionState {
    pub fn new(host: HostConfig, config: TransportConfig, size: TerminalSize) -> Self {
        Self {
            host,
            config,
            state: TransportState::Idle,
            reconnect_attempts: 0,
            size,
            live: None,
            generation: 0,
        }
    }

    fn is_live(&self, conn: ConnectionId) -> bool {
        self.live == Some(conn)
    }
}

// ---------------------------------------------------------------------------
// Inputs, timers, effects
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    ConnectTimeout,
    Backoff,
    Keepalive,
}

impl TimerKind {
    pub const ALL: [TimerKind; 3] = [
        TimerKind::ConnectTimeout,
        TimerKind::Backoff,
        TimerKind::Keepalive,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timer {
    ConnectTimeout(ConnectionId),
    Backoff,
    Keepalive(ConnectionId),
}

impl Timer {
    pub fn kind(self) -> TimerKind {
        match self {
            Timer::ConnectTimeout(_) => TimerKind::ConnectTimeout,
            Timer::Backoff => TimerKind::Backoff,
            Timer::Keepalive(_) => TimerKind::Keepalive,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Input {
    Open,
    ConnectionOpened(ConnectionId),
    FrameReceived { conn: ConnectionId, text: String },
    ConnectionClosed {
        conn: ConnectionId,
        reason: Option<String>,
    },
    /// The endpoint provider had nothing to dial
    EndpointUnavailable { conn: ConnectionId, message: String },
    TimerFired(Timer),
    TerminalInput(String),
    TerminalResize(TerminalSize),
    Close,
}

/// IO for the caller to perform, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Dial(ConnectionId),
    Send { conn: ConnectionId, frame: Frame },
    /// Drop the connection without going through the close path
    Disconnect(ConnectionId),
    /// Replaces any pending timer of the same kind
    Schedule { timer: Timer, after: Duration },
    Cancel(TimerKind),
    Write(String),
    Emit(TransportEventKind),
}

// ---------------------------------------------------------------------------
// Transition
// ---------------------------------------------------------------------------

pub fn transition(mut state: TransitionState, input: Input) -> (TransitionState, Vec<Effect>) {
    let mut effects = Vec::new();

    if state.state == TransportState::Closed {
        return (state, effects);
    }

    match input {
        Input::Open => {
            if state.state == TransportState::Idle {
                begin_dial(&mut state, &mut effects);
            }
        }

        Input::ConnectionOpened(conn) => {
            if state.is_live(conn) && state.state == TransportState::Connecting {
                let handshake = ConnectToHost::new(state.host.clone(), state.size);
                effects.push(Effect::Send {
                    conn,
                    frame: Frame::ConnectToHost(handshake),
                });
                effects.push(Effect::Schedule {
                    timer: Timer::ConnectTimeout(conn),
                    after: state.config.connect_timeout,
                });
                effects.push(Effect::Emit(TransportEventKind::Debug {
                    message: format!("handshake sent ({})", state.size),
                }));
            }
        }

        Input::FrameReceived { conn, text } => {
            if state.is_live(conn) {
                handle_frame(&mut state, conn, &text, &mut effects);
            }
        }

        Input::ConnectionClosed { conn, reason } => {
            if state.is_live(conn)
                && matches!(
                    state.state,
                    TransportState::Connecting | TransportState::Connected
                )
            {
                connection_lost(&mut state, conn, reason, &mut effects);
            }
        }

        Input::EndpointUnavailable { conn, message } => {
            if state.is_live(conn) {
                state.live = None;
                state.state = TransportState::Failed;
                cancel_all(&mut effects);
                effects.push(Effect::Emit(TransportEventKind::Error {
                    kind: ErrorKind::Configuration,
                    message,
                }));
            }
        }

        Input::TimerFired(timer) => match timer {
            Timer::ConnectTimeout(conn) => {
                if state.is_live(conn) && state.state == TransportState::Connecting {
                    effects.push(Effect::Emit(TransportEventKind::Error {
                        kind: ErrorKind::Timeout,
                        message: "connection timeout".to_string(),
                    }));
                }
            }
            Timer::Backoff => {
                if state.state == TransportState::Retrying {
                    begin_dial(&mut state, &mut effects);
                }
            }
            Timer::Keepalive(conn) => {
                if state.is_live(conn) && state.state == TransportState::Connected {
                    effects.push(Effect::Send {
                        conn,
                        frame: Frame::Ping,
                    });
                    effects.push(Effect::Schedule {
                        timer: Timer::Keepalive(conn),
                        after: state.config.keepalive_interval,
                    });
                }
            }
        },

        Input::TerminalInput(data) => {
            if let (TransportState::Connected, Some(conn)) = (state.state, state.live) {
                if !data.is_empty() {
                    effects.push(Effect::Send {
                        conn,
                        frame: Frame::Input(data),
                    });
                }
            }
        }

        Input::TerminalResize(size) => {
            state.size = size;
            if let (TransportState::Connected, Some(conn)) = (state.state, state.live) {
                effects.push(Effect::Send {
                    conn,
                    frame: Frame::Resize(size),
                });
            }
        }

        Input::Close => {
            state.state = TransportState::Closed;
            cancel_all(&mut effects);
            if let Some(conn) = state.live.take() {
                effects.push(Effect::Disconnect(conn));
            }
        }
    }

    (state, effects)
}

fn begin_dial(state: &mut TransitionState, effects: &mut Vec<Effect>) {
    if let Some(old) = state.live.take() {
        effects.push(Effect::Disconnect(old));
    }
    state.generation += 1;
    let conn = ConnectionId(state.generation);
    state.live = Some(conn);
    state.state = TransportState::Connecting;

    effects.push(Effect::Emit(TransportEventKind::Connecting {
        attempt: state.reconnect_attempts,
    }));
    effects.push(Effect::Dial(conn));
}

fn handle_frame(
    state: &mut TransitionState,
    conn: ConnectionId,
    text: &str,
    effects: &mut Vec<Effect>,
) {
    let frame = match decode(text) {
        Ok(frame) => frame,
        Err(e) => {
            effects.push(Effect::Emit(TransportEventKind::Error {
                kind: ErrorKind::Protocol,
                message: e.to_string(),
            }));
            return;
        }
    };

    if frame.direction() == Direction::ClientToRemote {
        effects.push(Effect::Emit(TransportEventKind::Error {
            kind: ErrorKind::Protocol,
            message: format!("unexpected {} frame from gateway", frame.frame_type()),
        }));
        return;
    }

    match frame {
        Frame::Data(data) => effects.push(Effect::Write(data)),

        Frame::Connected { .. } => {
            if state.state == TransportState::Connecting {
                state.state = TransportState::Connected;
                state.reconnect_attempts = 0;
                effects.push(Effect::Cancel(TimerKind::ConnectTimeout));
                effects.push(Effect::Schedule {
                    timer: Timer::Keepalive(conn),
                    after: state.config.keepalive_interval,
                });
                effects.push(Effect::Emit(TransportEventKind::Connected));
            }
        }

        // The remote shell is gone; reconnecting would open a fresh one.
        Frame::Disconnected { message } => {
            state.state = TransportState::Closed;
            state.live = None;
            cancel_all(effects);
            effects.push(Effect::Disconnect(conn));
            effects.push(Effect::Emit(TransportEventKind::Disconnected { reason: message }));
        }

        Frame::Error { message } => {
            effects.push(Effect::Emit(TransportEventKind::Error {
                kind: ErrorKind::Remote,
                message,
            }));
        }

        Frame::ConnectToHost(_) | Frame::Input(_) | Frame::Resize(_) | Frame::Ping => {}
    }
}

fn connection_lost(
    state: &mut TransitionState,
    conn: ConnectionId,
    reason: Option<String>,
    effects: &mut Vec<Effect>,
) {
    state.live = None;
    effects.push(Effect::Cancel(TimerKind::ConnectTimeout));
    effects.push(Effect::Cancel(TimerKind::Keepalive));
    effects.push(Effect::Disconnect(conn));
    effects.push(Effect::Emit(TransportEventKind::Debug {
        message: format!(
            "connection closed: {}",
            reason.as_deref().unwrap_or("no reason given")
        ),
    }));

    let attempt = state.reconnect_attempts.saturating_add(1);
    state.reconnect_attempts = attempt;
    let max_attempts = state.config.policy.max_attempts;

    match state.config.policy.next(attempt) {
        Backoff::Retry { delay } => {
            state.state = TransportState::Retrying;
            effects.push(Effect::Schedule {
                timer: Timer::Backoff,
                after: delay,
            });
            effects.push(Effect::Emit(TransportEventKind::Retrying {
                attempt,
                max_attempts,
                delay,
            }));
        }
        Backoff::GiveUp => {
            state.state = TransportState::Failed;
            effects.push(Effect::Emit(TransportEventKind::MaxRetriesReached { max_attempts }));
        }
    }
}

fn cancel_all(effects: &mut Vec<Effect>) {
    effects.extend(TimerKind::ALL.into_iter().map(Effect::Cancel));
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
