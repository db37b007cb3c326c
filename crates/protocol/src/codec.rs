//! Frame (de)serialization
//!
//! Every frame is a flat JSON object with exactly two fields, `type` and
//! `data`. Decoding is lenient about payload shape where gateways differ
//! (`connected` with no data, `error` with a bare string) and strict about
//! everything the client relies on.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::frame::{ConnectToHost, Frame, FrameType};
use crate::types::TerminalSize;

/// Errors produced while decoding a frame. None of them are fatal to a
/// connection.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid frame JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("unknown frame type: {0}")]
    UnknownType(String),

    #[error("malformed {frame_type} payload: {reason}")]
    MalformedData {
        frame_type: FrameType,
        reason: String,
    },
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("failed to serialize {frame_type} frame: {source}")]
    Serialize {
        frame_type: FrameType,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Serialize)]
struct Envelope<'a> {
    #[serde(rename = "type")]
    frame_type: &'a str,
    data: Value,
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    frame_type: String,
    #[serde(default)]
    data: Value,
}

/// Serialize a frame to its wire text.
pub fn encode(frame: &Frame) -> Result<String, EncodeError> {
    let frame_type = frame.frame_type();
    let wrap = |source| EncodeError::Serialize { frame_type, source };

    let data = match frame {
        Frame::ConnectToHost(payload) => serde_json::to_value(payload).map_err(wrap)?,
        Frame::Input(data) | Frame::Data(data) => Value::String(data.clone()),
        Frame::Resize(size) => serde_json::to_value(size).map_err(wrap)?,
        Frame::Ping => json!({}),
        Frame::Connected { host_name } => match host_name {
            Some(name) => json!({ "hostName": name }),
            None => json!({}),
        },
        Frame::Disconnected { message } => match message {
            Some(message) => json!({ "message": message }),
            None => json!({}),
        },
        Frame::Error { message } => json!({ "message": message }),
    };

    serde_json::to_string(&Envelope {
        frame_type: frame_type.as_str(),
        data,
    })
    .map_err(wrap)
}

/// Parse wire text into a frame.
pub fn decode(text: &str) -> Result<Frame, DecodeError> {
    let raw: RawFrame = serde_json::from_str(text)?;
    let frame_type =
        FrameType::parse(&raw.frame_type).ok_or(DecodeError::UnknownType(raw.frame_type))?;
    let data = raw.data;

    let frame = match frame_type {
        FrameType::ConnectToHost => {
            Frame::ConnectToHost(payload::<ConnectToHost>(frame_type, data)?)
        }
        FrameType::Input => Frame::Input(string_payload(frame_type, data)?),
        FrameType::Resize => Frame::Resize(payload::<TerminalSize>(frame_type, data)?),
        FrameType::Ping => Frame::Ping,
        FrameType::Data => Frame::Data(string_payload(frame_type, data)?),
        FrameType::Connected => Frame::Connected {
            host_name: object(frame_type, &data)?
                .and_then(|map| map.get("hostName"))
                .and_then(Value::as_str)
                .map(str::to_string),
        },
        FrameType::Disconnected => Frame::Disconnected {
            message: message_field(frame_type, &data)?,
        },
        FrameType::Error => Frame::Error {
            message: message_field(frame_type, &data)?
                .unwrap_or_else(|| "unspecified gateway error".to_string()),
        },
    };

    Ok(frame)
}

fn malformed(frame_type: FrameType, reason: impl Into<String>) -> DecodeError {
    DecodeError::MalformedData {
        frame_type,
        reason: reason.into(),
    }
}

fn payload<T: serde::de::DeserializeOwned>(
    frame_type: FrameType,
    data: Value,
) -> Result<T, DecodeError> {
    serde_json::from_value(data).map_err(|e| malformed(frame_type, e.to_string()))
}

fn string_payload(frame_type: FrameType, data: Value) -> Result<String, DecodeError> {
    match data {
        Value::String(s) => Ok(s),
        other => Err(malformed(
            frame_type,
            format!("expected string, got {}", json_kind(&other)),
        )),
    }
}

/// `null`/missing data is treated as an empty object.
fn object(frame_type: FrameType, data: &Value) -> Result<Option<&Map<String, Value>>, DecodeError> {
    match data {
        Value::Null => Ok(None),
        Value::Object(map) => Ok(Some(map)),
        other => Err(malformed(
            frame_type,
            format!("expected object, got {}", json_kind(other)),
        )),
    }
}

/// Accepts `{"message": "..."}`, a bare string, or nothing.
fn message_field(frame_type: FrameType, data: &Value) -> Result<Option<String>, DecodeError> {
    match data {
        Value::String(s) => Ok(Some(s.clone())),
        _ => match object(frame_type, data)?.and_then(|map| map.get("message")) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(malformed(
                frame_type,
                format!("message must be a string, got {}", json_kind(other)),
            )),
        },
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AuthMethod, HostConfig};

    fn test_host() -> HostConfig {
        HostConfig {
            id: 3,
            name: "staging".to_string(),
            address: "staging.example.com".to_string(),
            port: 22,
            username: "ops".to_string(),
            auth: AuthMethod::Password {
                password: "secret".to_string(),
            },
        }
    }

    fn top_level_keys(text: &str) -> Vec<String> {
        let value: Value = serde_json::from_str(text).expect("valid json");
        let mut keys: Vec<String> = value
            .as_object()
            .expect("object")
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    #[test]
    fn connect_to_host_carries_size_and_host() {
        let frame = Frame::ConnectToHost(ConnectToHost::new(test_host(), TerminalSize::new(120, 40)));
        let text = encode(&frame).expect("encode");
        let value: Value = serde_json::from_str(&text).expect("json");

        assert_eq!(top_level_keys(&text), vec!["data", "type"]);
        assert_eq!(value["type"], "connectToHost");
        assert_eq!(value["data"]["cols"], 120);
        assert_eq!(value["data"]["rows"], 40);
        assert_eq!(value["data"]["hostConfig"]["name"], "staging");
        assert_eq!(value["data"]["hostConfig"]["authType"], "password");

        assert_eq!(decode(&text).expect("decode"), frame);
    }

    #[test]
    fn input_preserves_control_sequences() {
        let keys = "\u{1b}[A\u{1b}OP\u{3}\r";
        let text = encode(&Frame::Input(keys.to_string())).expect("encode");
        let value: Value = serde_json::from_str(&text).expect("json");
        assert_eq!(value["data"], keys);
        assert_eq!(decode(&text).expect("decode"), Frame::Input(keys.to_string()));
    }

    #[test]
    fn every_frame_has_exactly_type_and_data() {
        let frames = [
            Frame::Resize(TerminalSize::new(80, 24)),
            Frame::Ping,
            Frame::Data("x".into()),
            Frame::Connected { host_name: None },
            Frame::Disconnected { message: None },
            Frame::Error {
                message: "boom".into(),
            },
        ];
        for frame in frames {
            let text = encode(&frame).expect("encode");
            assert_eq!(top_level_keys(&text), vec!["data", "type"], "{text}");
        }
    }

    #[test]
    fn ping_encodes_empty_object() {
        assert_eq!(encode(&Frame::Ping).unwrap(), r#"{"type":"ping","data":{}}"#);
    }

    #[test]
    fn connected_without_data_decodes() {
        assert_eq!(
            decode(r#"{"type":"connected"}"#).unwrap(),
            Frame::Connected { host_name: None }
        );
        assert_eq!(
            decode(r#"{"type":"connected","data":{"hostName":"staging"}}"#).unwrap(),
            Frame::Connected {
                host_name: Some("staging".into())
            }
        );
    }

    #[test]
    fn error_accepts_object_or_bare_string() {
        assert_eq!(
            decode(r#"{"type":"error","data":{"message":"auth failed"}}"#).unwrap(),
            Frame::Error {
                message: "auth failed".into()
            }
        );
        assert_eq!(
            decode(r#"{"type":"error","data":"auth failed"}"#).unwrap(),
            Frame::Error {
                message: "auth failed".into()
            }
        );
        assert!(matches!(
            decode(r#"{"type":"error","data":{}}"#).unwrap(),
            Frame::Error { .. }
        ));
    }

    #[test]
    fn disconnected_message_is_optional() {
        assert_eq!(
            decode(r#"{"type":"disconnected","data":{"message":"shell exited"}}"#).unwrap(),
            Frame::Disconnected {
                message: Some("shell exited".into())
            }
        );
        assert_eq!(
            decode(r#"{"type":"disconnected","data":null}"#).unwrap(),
            Frame::Disconnected { message: None }
        );
    }

    #[test]
    fn unknown_type_is_a_decode_error() {
        match decode(r#"{"type":"telemetry","data":{}}"#) {
            Err(DecodeError::UnknownType(t)) => assert_eq!(t, "telemetry"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn malformed_payloads_are_decode_errors() {
        assert!(matches!(
            decode(r#"{"type":"data","data":{"bytes":"ls"}}"#),
            Err(DecodeError::MalformedData {
                frame_type: FrameType::Data,
                ..
            })
        ));
        assert!(matches!(
            decode(r#"{"type":"resize","data":{"cols":"wide"}}"#),
            Err(DecodeError::MalformedData {
                frame_type: FrameType::Resize,
                ..
            })
        ));
        assert!(matches!(
            decode(r#"{"type":"error","data":{"message":42}}"#),
            Err(DecodeError::MalformedData { .. })
        ));
        assert!(matches!(decode("not json"), Err(DecodeError::InvalidJson(_))));
        assert!(matches!(decode(r#"{"data":"x"}"#), Err(DecodeError::InvalidJson(_))));
    }
}
