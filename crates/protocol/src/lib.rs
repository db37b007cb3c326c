//! ShellGate Protocol
//!
//! Shared types for communication between the ShellGate client and the
//! terminal gateway. Frames are serialized as `{"type": ..., "data": ...}`
//! JSON objects, one per WebSocket text message.

pub mod codec;
pub mod frame;
pub mod types;

pub use codec::{decode, encode, DecodeError, EncodeError};
pub use frame::{ConnectToHost, Direction, Frame, FrameType};
pub use types::*;
