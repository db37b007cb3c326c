//! Frame catalogue
//!
//! Client → gateway: `connectToHost`, `input`, `resize`, `ping`.
//! Gateway → client: `data`, `connected`, `disconnected`, `error`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{HostConfig, TerminalSize};

/// Who sends a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToRemote,
    RemoteToClient,
}

/// Wire value of a frame's `type` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FrameType {
    ConnectToHost,
    Input,
    Resize,
    Ping,
    Data,
    Connected,
    Disconnected,
    Error,
}

impl FrameType {
    pub const ALL: [FrameType; 8] = [
        FrameType::ConnectToHost,
        FrameType::Input,
        FrameType::Resize,
        FrameType::Ping,
        FrameType::Data,
        FrameType::Connected,
        FrameType::Disconnected,
        FrameType::Error,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FrameType::ConnectToHost => "connectToHost",
            FrameType::Input => "input",
            FrameType::Resize => "resize",
            FrameType::Ping => "ping",
            FrameType::Data => "data",
            FrameType::Connected => "connected",
            FrameType::Disconnected => "disconnected",
            FrameType::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<FrameType> {
        FrameType::ALL.into_iter().find(|t| t.as_str() == value)
    }

    pub fn direction(self) -> Direction {
        match self {
            FrameType::ConnectToHost | FrameType::Input | FrameType::Resize | FrameType::Ping => {
                Direction::ClientToRemote
            }
            FrameType::Data | FrameType::Connected | FrameType::Disconnected | FrameType::Error => {
                Direction::RemoteToClient
            }
        }
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handshake payload sent on every new connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectToHost {
    pub cols: u16,
    pub rows: u16,
    pub host_config: HostConfig,
}

impl ConnectToHost {
    pub fn new(host_config: HostConfig, size: TerminalSize) -> Self {
        Self {
            cols: size.cols,
            rows: size.rows,
            host_config,
        }
    }
}

/// One message on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    // Client → gateway
    ConnectToHost(ConnectToHost),
    /// Raw keystrokes, forwarded byte-for-byte
    Input(String),
    Resize(TerminalSize),
    Ping,

    // Gateway → client
    /// Raw terminal output
    Data(String),
    Connected {
        host_name: Option<String>,
    },
    Disconnected {
        message: Option<String>,
    },
    Error {
        message: String,
    },
}

impl Frame {
    pub fn frame_type(&self) -> FrameType {
        match self {
            Frame::ConnectToHost(_) => FrameType::ConnectToHost,
            Frame::Input(_) => FrameType::Input,
            Frame::Resize(_) => FrameType::Resize,
            Frame::Ping => FrameType::Ping,
            Frame::Data(_) => FrameType::Data,
            Frame::Connected { .. } => FrameType::Connected,
            Frame::Disconnected { .. } => FrameType::Disconnected,
            Frame::Error { .. } => FrameType::Error,
        }
    }

    pub fn direction(&self) -> Direction {
        self.frame_type().direction()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_type_strings_match_serde_names() {
        for frame_type in FrameType::ALL {
            let json = serde_json::to_string(&frame_type).expect("serialize frame type");
            assert_eq!(json, format!("\"{}\"", frame_type.as_str()));
            assert_eq!(FrameType::parse(frame_type.as_str()), Some(frame_type));
        }
        assert_eq!(FrameType::parse("maxRetriesReached"), None);
    }

    #[test]
    fn directions_split_catalogue_in_half() {
        let outbound = FrameType::ALL
            .iter()
            .filter(|t| t.direction() == Direction::ClientToRemote)
            .count();
        assert_eq!(outbound, 4);
        assert_eq!(Frame::Ping.direction(), Direction::ClientToRemote);
        assert_eq!(
            Frame::Data("ls\r\n".into()).direction(),
            Direction::RemoteToClient
        );
    }
}
