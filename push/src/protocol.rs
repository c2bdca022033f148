//! The JSON hub protocol spoken on `/signalr`.
//!
//! Every message is a JSON object terminated by the ASCII record separator (`0x1E`).
//! A session starts with a handshake (`{"protocol":"json","version":1}` answered by
//! `{}`), after which both sides exchange typed messages. Only the message types the
//! relay needs are modelled: invocations, completions, pings and close.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Terminates every message on the wire.
pub const RECORD_SEPARATOR: char = '\u{1e}';

pub const PROTOCOL_NAME: &str = "json";
pub const PROTOCOL_VERSION: u32 = 1;
pub const NEGOTIATE_VERSION: u32 = 1;

const INVOCATION: u8 = 1;
const COMPLETION: u8 = 3;
const PING: u8 = 6;
const CLOSE: u8 = 7;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed hub message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported hub protocol '{protocol}' version {version}")]
    UnsupportedProtocol { protocol: String, version: u32 },

    #[error("Hub message of type {kind} is missing '{field}'")]
    MissingField { kind: u8, field: &'static str },
}

/// Split a WebSocket text message into the individual hub messages it carries.
pub fn split_frames(text: &str) -> impl Iterator<Item = &str> {
    text.split(RECORD_SEPARATOR).filter(|frame| !frame.trim().is_empty())
}

fn to_frame<T: Serialize>(message: &T) -> Result<String, serde_json::Error> {
    let mut frame = serde_json::to_string(message)?;
    frame.push(RECORD_SEPARATOR);
    Ok(frame)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeRequest {
    pub protocol: String,
    pub version: u32,
}

impl HandshakeRequest {
    /// Parse a handshake frame and check the client asked for the JSON protocol.
    pub fn parse(frame: &str) -> Result<Self, ProtocolError> {
        let request: HandshakeRequest = serde_json::from_str(frame)?;
        if request.protocol != PROTOCOL_NAME || request.version != PROTOCOL_VERSION {
            return Err(ProtocolError::UnsupportedProtocol {
                protocol: request.protocol,
                version: request.version,
            });
        }
        Ok(request)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HandshakeResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HandshakeResponse {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
        }
    }

    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        to_frame(self)
    }
}

/// Hub messages exchanged after the handshake.
#[derive(Debug, Clone, PartialEq)]
pub enum HubMessage {
    Invocation {
        invocation_id: Option<String>,
        target: String,
        arguments: Vec<Value>,
    },
    Completion {
        invocation_id: String,
        error: Option<String>,
    },
    Ping,
    Close {
        error: Option<String>,
        allow_reconnect: bool,
    },
    /// Any message type the relay does not act on (stream items, acks, ...)
    Unsupported(u8),
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    invocation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    arguments: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    allow_reconnect: Option<bool>,
}

impl HubMessage {
    /// A server-to-client call of `target` that expects no completion.
    pub fn invocation(target: impl Into<String>, arguments: Vec<Value>) -> Self {
        HubMessage::Invocation {
            invocation_id: None,
            target: target.into(),
            arguments,
        }
    }

    pub fn parse(frame: &str) -> Result<Self, ProtocolError> {
        let raw: RawMessage = serde_json::from_str(frame)?;
        let message = match raw.kind {
            INVOCATION => HubMessage::Invocation {
                invocation_id: raw.invocation_id,
                target: raw.target.ok_or(ProtocolError::MissingField {
                    kind: INVOCATION,
                    field: "target",
                })?,
                arguments: raw.arguments.unwrap_or_default(),
            },
            COMPLETION => HubMessage::Completion {
                invocation_id: raw.invocation_id.ok_or(ProtocolError::MissingField {
                    kind: COMPLETION,
                    field: "invocationId",
                })?,
                error: raw.error,
            },
            PING => HubMessage::Ping,
            CLOSE => HubMessage::Close {
                error: raw.error,
                allow_reconnect: raw.allow_reconnect.unwrap_or(false),
            },
            other => HubMessage::Unsupported(other),
        };
        Ok(message)
    }

    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        let raw = match self {
            HubMessage::Invocation {
                invocation_id,
                target,
                arguments,
            } => RawMessage {
                kind: INVOCATION,
                invocation_id: invocation_id.clone(),
                target: Some(target.clone()),
                arguments: Some(arguments.clone()),
                ..Default::default()
            },
            HubMessage::Completion {
                invocation_id,
                error,
            } => RawMessage {
                kind: COMPLETION,
                invocation_id: Some(invocation_id.clone()),
                error: error.clone(),
                ..Default::default()
            },
            HubMessage::Ping => RawMessage {
                kind: PING,
                ..Default::default()
            },
            HubMessage::Close {
                error,
                allow_reconnect,
            } => RawMessage {
                kind: CLOSE,
                error: error.clone(),
                allow_reconnect: allow_reconnect.then_some(true),
                ..Default::default()
            },
            HubMessage::Unsupported(kind) => RawMessage {
                kind: *kind,
                ..Default::default()
            },
        };
        to_frame(&raw)
    }
}

/// Body of `POST /signalr/negotiate`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiateResponse {
    pub negotiate_version: u32,
    pub connection_id: String,
    pub connection_token: String,
    pub available_transports: Vec<AvailableTransport>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableTransport {
    pub transport: &'static str,
    pub transfer_formats: Vec<&'static str>,
}

impl AvailableTransport {
    pub fn websockets() -> Self {
        Self {
            transport: "WebSockets",
            transfer_formats: vec!["Text"],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_json(frame: &str) -> Value {
        let body = frame
            .strip_suffix(RECORD_SEPARATOR)
            .expect("frame must end with the record separator");
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn test_handshake_accepts_json_v1() {
        let request = HandshakeRequest::parse(r#"{"protocol":"json","version":1}"#).unwrap();
        assert_eq!(request.protocol, "json");
    }

    #[test]
    fn test_handshake_rejects_other_protocols() {
        let result = HandshakeRequest::parse(r#"{"protocol":"messagepack","version":1}"#);
        assert!(matches!(
            result,
            Err(ProtocolError::UnsupportedProtocol { ref protocol, version: 1 }) if protocol == "messagepack"
        ));
    }

    #[test]
    fn test_handshake_responses() {
        assert_eq!(HandshakeResponse::ok().to_frame().unwrap(), "{}\u{1e}");
        assert_eq!(
            as_json(&HandshakeResponse::error("nope").to_frame().unwrap()),
            json!({"error": "nope"})
        );
    }

    #[test]
    fn test_invocation_wire_format() {
        let frame = HubMessage::invocation("ReceiveMessage", vec![json!("cGF5bG9hZA==")])
            .to_frame()
            .unwrap();
        assert_eq!(
            as_json(&frame),
            json!({"type": 1, "target": "ReceiveMessage", "arguments": ["cGF5bG9hZA=="]})
        );
    }

    #[test]
    fn test_ping_and_close_wire_format() {
        assert_eq!(HubMessage::Ping.to_frame().unwrap(), "{\"type\":6}\u{1e}");
        let close = HubMessage::Close {
            error: None,
            allow_reconnect: false,
        };
        assert_eq!(close.to_frame().unwrap(), "{\"type\":7}\u{1e}");
    }

    #[test]
    fn test_parse_client_messages() {
        assert_eq!(HubMessage::parse(r#"{"type":6}"#).unwrap(), HubMessage::Ping);
        assert_eq!(
            HubMessage::parse(r#"{"type":7,"error":"bye","allowReconnect":true}"#).unwrap(),
            HubMessage::Close {
                error: Some("bye".to_string()),
                allow_reconnect: true
            }
        );
        assert_eq!(
            HubMessage::parse(r#"{"type":1,"invocationId":"4","target":"Echo","arguments":[1]}"#)
                .unwrap(),
            HubMessage::Invocation {
                invocation_id: Some("4".to_string()),
                target: "Echo".to_string(),
                arguments: vec![json!(1)]
            }
        );
        assert_eq!(
            HubMessage::parse(r#"{"type":2,"invocationId":"1","item":5}"#).unwrap(),
            HubMessage::Unsupported(2)
        );
    }

    #[test]
    fn test_invocation_without_target_is_rejected() {
        assert!(matches!(
            HubMessage::parse(r#"{"type":1,"arguments":[]}"#),
            Err(ProtocolError::MissingField { field: "target", .. })
        ));
    }

    #[test]
    fn test_split_frames_skips_empty_segments() {
        let text = "{\"protocol\":\"json\",\"version\":1}\u{1e}{\"type\":6}\u{1e}";
        let frames: Vec<&str> = split_frames(text).collect();
        assert_eq!(frames, vec![r#"{"protocol":"json","version":1}"#, r#"{"type":6}"#]);
    }

    #[test]
    fn test_negotiate_response_shape() {
        let response = NegotiateResponse {
            negotiate_version: NEGOTIATE_VERSION,
            connection_id: "abc".to_string(),
            connection_token: "tok".to_string(),
            available_transports: vec![AvailableTransport::websockets()],
        };
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "negotiateVersion": 1,
                "connectionId": "abc",
                "connectionToken": "tok",
                "availableTransports": [{"transport": "WebSockets", "transferFormats": ["Text"]}]
            })
        );
    }
}
