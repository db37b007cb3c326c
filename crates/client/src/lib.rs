//! ShellGate client
//!
//! Terminal sessions to SSH hosts, carried over WebSocket through a gateway.
//! Each session owns one transport; the session manager tracks which tab is
//! active and the supervisor closes tabs whose transport has given up.

pub mod cli;
pub mod config;
pub mod connection;
pub mod event;
pub mod interactive;
pub mod logging;
pub mod manager;
pub mod notify;
pub mod paths;
pub mod reconnect;
pub mod session;
pub mod supervisor;
pub mod surface;
pub mod transition;
pub mod transport;
pub mod tty;

pub use config::{ClientConfig, ConfigError, EndpointProvider, ServerUrl};
pub use connection::{Connection, ConnectionEvent, ConnectionMessage, Dialer, WebSocketDialer};
pub use event::{ErrorKind, TransportEvent, TransportEventKind};
pub use manager::{SessionManager, SessionTransport, View};
pub use notify::{Notice, NoticeLevel, Notifier};
pub use reconnect::{Backoff, ReconnectPolicy};
pub use session::{Session, SessionId};
pub use supervisor::{Supervisor, AUTO_CLOSE_GRACE};
pub use surface::TerminalSurface;
pub use transition::{ConnectionId, TransportConfig, TransportState};
pub use transport::{TransportContext, TransportHandle, TransportSnapshot};
