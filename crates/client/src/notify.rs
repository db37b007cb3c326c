//! Human-readable status notices
//!
//! The presentation layer decides how notices are shown; this module only
//! turns transport events into text.

use std::io::Write;

use tracing::{info, warn};

use crate::event::{ErrorKind, TransportEvent, TransportEventKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

impl Notice {
    /// `None` for events that are not worth showing to a user.
    pub fn from_event(event: &TransportEvent) -> Option<Notice> {
        let host = &event.host_name;
        let (level, text) = match &event.kind {
            TransportEventKind::Connecting { attempt: 0 } => {
                (NoticeLevel::Info, format!("Connecting to {host}..."))
            }
            TransportEventKind::Connecting { attempt } => (
                NoticeLevel::Info,
                format!("Reconnecting to {host} (attempt {attempt})..."),
            ),
            TransportEventKind::Connected => (NoticeLevel::Success, format!("Connected to {host}")),
            TransportEventKind::Disconnected { reason } => (
                NoticeLevel::Warning,
                match reason {
                    Some(reason) => format!("Disconnected from {host}: {reason}"),
                    None => format!("Disconnected from {host}"),
                },
            ),
            TransportEventKind::Retrying {
                attempt,
                max_attempts,
                delay,
            } => (
                NoticeLevel::Warning,
                format!(
                    "Connection to {host} lost, retrying in {:.1}s ({attempt}/{max_attempts})",
                    delay.as_secs_f64()
                ),
            ),
            TransportEventKind::MaxRetriesReached { max_attempts } => (
                NoticeLevel::Error,
                format!("Could not reconnect to {host} after {max_attempts} attempts"),
            ),
            TransportEventKind::Error { kind, message } => {
                let prefix = match kind {
                    ErrorKind::Remote => "Gateway error",
                    ErrorKind::Protocol => "Protocol error",
                    ErrorKind::Timeout => "Timed out",
                    ErrorKind::Configuration => "Configuration error",
                };
                (NoticeLevel::Error, format!("{prefix} ({host}): {message}"))
            }
            TransportEventKind::Debug { .. } => return None,
        };
        Some(Notice { level, text })
    }
}

/// Where notices end up
pub trait Notifier: Send + Sync + 'static {
    fn notify(&self, notice: Notice);
}

/// Routes notices into the log.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Info | NoticeLevel::Success => info!(
                component = "notify",
                event = "notice",
                level = ?notice.level,
                "{}",
                notice.text
            ),
            NoticeLevel::Warning | NoticeLevel::Error => warn!(
                component = "notify",
                event = "notice",
                level = ?notice.level,
                "{}",
                notice.text
            ),
        }
    }
}

/// Prints notices on their own line to stderr.
#[derive(Debug, Clone, Default)]
pub struct StderrNotifier;

impl Notifier for StderrNotifier {
    fn notify(&self, notice: Notice) {
        let mut stderr = std::io::stderr().lock();
        // The tty may be in raw mode, so return the carriage explicitly.
        let _ = write!(stderr, "\r\n[shellgate] {}\r\n", notice.text);
        let _ = stderr.flush();
    }
}
