//! `shellgate connect`: sessions bound to the local tty
//!
//! Keys handled locally (everything else goes to the foreground session):
//! `Ctrl-]` closes the foreground session, `Ctrl-\` switches to the next one.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use shellgate_protocol::HostConfig;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{mpsc, Mutex};
use tracing::info;

use crate::config::EndpointProvider;
use crate::connection::WebSocketDialer;
use crate::manager::SessionManager;
use crate::notify::StderrNotifier;
use crate::session::SessionId;
use crate::supervisor::Supervisor;
use crate::transition::TransportConfig;
use crate::transport::{TransportContext, TransportHandle};
use crate::tty::{spawn_stdin_reader, terminal_size, RawModeGuard, Screen};

pub const CLOSE_KEY: u8 = 0x1d;
pub const NEXT_KEY: u8 = 0x1c;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Key<'a> {
    Input(&'a [u8]),
    Close,
    Next,
}

/// Split raw stdin bytes into pass-through input and local commands.
fn split_keys(bytes: &[u8]) -> Vec<Key<'_>> {
    let mut keys = Vec::new();
    let mut start = 0;
    for (i, byte) in bytes.iter().enumerate() {
        let key = match *byte {
            CLOSE_KEY => Key::Close,
            NEXT_KEY => Key::Next,
            _ => continue,
        };
        if start < i {
            keys.push(Key::Input(&bytes[start..i]));
        }
        keys.push(key);
        start = i + 1;
    }
    if start < bytes.len() {
        keys.push(Key::Input(&bytes[start..]));
    }
    keys
}

/// What one stdin read asks the client to do
#[derive(Debug, Clone, PartialEq, Eq)]
enum Action {
    Input(String),
    Close,
    Next,
}

/// Turns raw stdin reads into actions. A multibyte character split across
/// reads is held back until its last byte arrives.
#[derive(Debug, Default)]
struct InputDecoder {
    partial: Vec<u8>,
}

impl InputDecoder {
    fn feed(&mut self, bytes: &[u8]) -> Vec<Action> {
        let mut actions = Vec::new();
        for key in split_keys(bytes) {
            match key {
                Key::Input(data) => {
                    let text = self.decode(data);
                    if !text.is_empty() {
                        actions.push(Action::Input(text));
                    }
                }
                // Command keys are ASCII, so a pending sequence before one
                // can never complete.
                Key::Close => {
                    self.partial.clear();
                    actions.push(Action::Close);
                }
                Key::Next => {
                    self.partial.clear();
                    actions.push(Action::Next);
                }
            }
        }
        actions
    }

    fn decode(&mut self, data: &[u8]) -> String {
        let mut buf = std::mem::take(&mut self.partial);
        buf.extend_from_slice(data);

        let mut text = String::with_capacity(buf.len());
        let mut rest = buf.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    text.push_str(valid);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    if let Ok(valid) = std::str::from_utf8(valid) {
                        text.push_str(valid);
                    }
                    match e.error_len() {
                        Some(len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            self.partial = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        text
    }
}

struct Client {
    manager: Arc<Mutex<SessionManager>>,
    screen: Screen,
    handles: HashMap<SessionId, TransportHandle>,
    decoder: InputDecoder,
}

impl Client {
    async fn handle_bytes(&mut self, bytes: &[u8]) {
        for action in self.decoder.feed(bytes) {
            match action {
                Action::Input(text) => {
                    if let Some(handle) = self.active_handle().await {
                        handle.input(text);
                    }
                }
                Action::Close => {
                    let active = self.manager.lock().await.active_session().map(|s| s.id.clone());
                    if let Some(id) = active {
                        self.manager.lock().await.remove_session(&id);
                        self.forget(&id).await;
                    }
                }
                Action::Next => self.cycle().await,
            }
        }
    }

    async fn active_handle(&self) -> Option<&TransportHandle> {
        let manager = self.manager.lock().await;
        let id = &manager.active_session()?.id;
        self.handles.get(id)
    }

    async fn cycle(&mut self) {
        let mut manager = self.manager.lock().await;
        let sessions = manager.sessions();
        let Some(current) = sessions.iter().position(|s| s.is_active) else {
            return;
        };
        let next = sessions[(current + 1) % sessions.len()].id.clone();
        manager.set_active_session(&next);
        self.screen.focus(Some(&next));
    }

    /// Drop local state for a session the manager no longer has.
    async fn forget(&mut self, id: &SessionId) {
        self.handles.remove(id);
        self.screen.forget(id);
        let manager = self.manager.lock().await;
        self.screen.focus(manager.active_session().map(|s| &s.id));
    }

    fn resize_all(&self) {
        let size = terminal_size();
        for handle in self.handles.values() {
            handle.resize(size);
        }
    }
}

/// Open one session per host and run until every session is gone or stdin
/// closes.
pub async fn run(hosts: Vec<HostConfig>, endpoint: Arc<dyn EndpointProvider>) -> anyhow::Result<()> {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let ctx = TransportContext {
        dialer: Arc::new(WebSocketDialer),
        endpoint,
        events: events_tx,
        config: TransportConfig::default(),
    };
    let manager = Arc::new(Mutex::new(SessionManager::new(ctx)));
    let mut client = Client {
        manager: Arc::clone(&manager),
        screen: Screen::default(),
        handles: HashMap::new(),
        decoder: InputDecoder::default(),
    };

    let (removed_tx, mut removed_rx) = mpsc::unbounded_channel();
    let supervisor = Supervisor::new(Arc::clone(&manager), Arc::new(StderrNotifier), events_rx)
        .with_removal_listener(removed_tx);
    let supervisor_task = tokio::spawn(supervisor.run());

    let _raw = RawModeGuard::enter().context("failed to put the terminal in raw mode")?;
    let mut winch =
        signal(SignalKind::window_change()).context("failed to listen for SIGWINCH")?;
    let mut stdin = spawn_stdin_reader();

    {
        let mut m = manager.lock().await;
        for host in hosts {
            let id = m.add_session(host);
            let surface = client.screen.surface(id.clone());
            if let Some(handle) = m.open_terminal(&id, surface) {
                client.handles.insert(id, handle);
            }
        }
        m.navigate_to_sessions(None);
        client.screen.focus(m.active_session().map(|s| &s.id));
        info!(
            component = "cli",
            event = "cli.connect.started",
            sessions = m.len(),
            "Sessions opened"
        );
    }

    loop {
        tokio::select! {
            bytes = stdin.recv() => match bytes {
                Some(bytes) => client.handle_bytes(&bytes).await,
                None => break,
            },
            _ = winch.recv() => client.resize_all(),
            Some(id) = removed_rx.recv() => client.forget(&id).await,
        }

        if manager.lock().await.is_empty() {
            break;
        }
    }

    manager.lock().await.clear();
    supervisor_task.abort();
    info!(component = "cli", event = "cli.connect.finished", "All sessions closed");
    Ok(())
}
