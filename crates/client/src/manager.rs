//! Session manager: the ordered set of terminal tabs and which one is active.
//!
//! Invariant after every public call: exactly one session is active, or none
//! when the set is empty.

use std::collections::HashMap;

use shellgate_protocol::HostConfig;
use tracing::{debug, info};

use crate::session::{Session, SessionId};
use crate::surface::TerminalSurface;
use crate::transport::{TransportContext, TransportHandle};

/// What the manager needs from a session's transport
pub trait SessionTransport: Send + 'static {
    fn close(&self);
}

impl SessionTransport for TransportHandle {
    fn close(&self) {
        TransportHandle::close(self);
    }
}

/// Top-level screen the UI should show
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Hosts,
    Sessions,
}

pub struct SessionManager {
    /// Oldest first
    sessions: Vec<Session>,
    transports: HashMap<SessionId, Box<dyn SessionTransport>>,
    ctx: TransportContext,
    view: View,
}

impl SessionManager {
    pub fn new(ctx: TransportContext) -> Self {
        Self {
            sessions: Vec::new(),
            transports: HashMap::new(),
            ctx,
            view: View::Hosts,
        }
    }

    pub fn context(&self) -> &TransportContext {
        &self.ctx
    }

    /// Create a session for `host` and make it the active one. The transport
    /// is not opened here; see `open_terminal`.
    pub fn add_session(&mut self, host: HostConfig) -> SessionId {
        let duplicates = self.sessions.iter().filter(|s| s.host.id == host.id).count();
        let title = if duplicates == 0 {
            host.name.clone()
        } else {
            format!("{} ({})", host.name, duplicates + 1)
        };

        let mut session = Session::new(host, title);
        for existing in &mut self.sessions {
            existing.is_active = false;
        }
        session.is_active = true;
        let id = session.id.clone();

        info!(
            component = "session_manager",
            event = "session.added",
            session_id = %id,
            host = %session.host.name,
            "Session added"
        );
        self.sessions.push(session);
        id
    }

    /// Remove a session and close its transport. If it was active, the most
    /// recently added remaining session becomes active.
    pub fn remove_session(&mut self, id: &SessionId) -> Option<Session> {
        let index = self.sessions.iter().position(|s| &s.id == id)?;
        let removed = self.sessions.remove(index);

        if let Some(transport) = self.transports.remove(id) {
            transport.close();
        }

        if removed.is_active {
            if let Some(last) = self.sessions.last_mut() {
                last.is_active = true;
            }
        }

        info!(
            component = "session_manager",
            event = "session.removed",
            session_id = %id,
            remaining = self.sessions.len(),
            "Session removed"
        );
        Some(removed)
    }

    /// Returns false (and changes nothing) for unknown ids.
    pub fn set_active_session(&mut self, id: &SessionId) -> bool {
        if !self.sessions.iter().any(|s| &s.id == id) {
            debug!(
                component = "session_manager",
                event = "session.activate.unknown",
                session_id = %id,
                "Ignoring activation of unknown session"
            );
            return false;
        }
        for session in &mut self.sessions {
            session.is_active = &session.id == id;
        }
        true
    }

    /// Optionally add `host`, then switch the UI to the sessions view.
    pub fn navigate_to_sessions(&mut self, host: Option<HostConfig>) -> Option<SessionId> {
        let id = host.map(|host| self.add_session(host));
        self.view = View::Sessions;
        id
    }

    pub fn navigate_to_hosts(&mut self) {
        self.view = View::Hosts;
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn session(&self, id: &SessionId) -> Option<&Session> {
        self.sessions.iter().find(|s| &s.id == id)
    }

    pub fn active_session(&self) -> Option<&Session> {
        self.sessions.iter().find(|s| s.is_active)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Mount a terminal view: spawn and open the session's transport.
    pub fn open_terminal<S: TerminalSurface>(
        &mut self,
        id: &SessionId,
        surface: S,
    ) -> Option<TransportHandle> {
        let host = self.session(id)?.host.clone();
        let handle = TransportHandle::spawn(id.clone(), host, surface, &self.ctx);
        self.attach_transport(id, Box::new(handle.clone()));
        Some(handle)
    }

    /// Bind a transport to a session. A transport previously bound to the same
    /// session is closed first; one offered for an unknown session is closed
    /// immediately.
    pub fn attach_transport(&mut self, id: &SessionId, transport: Box<dyn SessionTransport>) -> bool {
        if self.session(id).is_none() {
            transport.close();
            return false;
        }
        if let Some(previous) = self.transports.insert(id.clone(), transport) {
            previous.close();
        }
        true
    }

    /// Unmount a terminal view. The session itself stays.
    pub fn detach_transport(&mut self, id: &SessionId) -> bool {
        match self.transports.remove(id) {
            Some(transport) => {
                transport.close();
                true
            }
            None => false,
        }
    }

    pub fn has_transport(&self, id: &SessionId) -> bool {
        self.transports.contains_key(id)
    }

    /// Close every transport and forget every session.
    pub fn clear(&mut self) {
        for (_, transport) in self.transports.drain() {
            transport.close();
        }
        self.sessions.clear();
    }
}
