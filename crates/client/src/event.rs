//! Lifecycle events a transport reports to the session layer.

use std::time::Duration;

use crate::session::SessionId;

/// Why an `Error` event was raised
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Gateway sent an `error` frame
    Remote,
    /// Undecodable or unexpected frame
    Protocol,
    /// No `connected` frame within the handshake window
    Timeout,
    /// No gateway endpoint could be resolved; never retried
    Configuration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEventKind {
    Connecting {
        attempt: u32,
    },
    Connected,
    Disconnected {
        reason: Option<String>,
    },
    Retrying {
        attempt: u32,
        max_attempts: u32,
        delay: Duration,
    },
    MaxRetriesReached {
        max_attempts: u32,
    },
    Error {
        kind: ErrorKind,
        message: String,
    },
    Debug {
        message: String,
    },
}

/// Event tagged with the session it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEvent {
    pub session_id: SessionId,
    pub host_name: String,
    pub kind: TransportEventKind,
}

impl TransportEventKind {
    /// Events after which the tab should close on its own.
    pub fn is_terminal_failure(&self) -> bool {
        matches!(
            self,
            TransportEventKind::Disconnected { .. }
                | TransportEventKind::MaxRetriesReached { .. }
                | TransportEventKind::Error {
                    kind: ErrorKind::Configuration,
                    ..
                }
        )
    }
}
