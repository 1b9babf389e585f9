//! Engine.IO v4 / Socket.IO v5 text framing.
//!
//! Only the WebSocket transport is spoken, so every frame is a single text
//! message: one Engine.IO type digit, optionally followed by a Socket.IO packet.
//! Binary attachments are not supported.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Engine.IO protocol revision sent in the `EIO` query parameter.
pub const ENGINE_IO_VERSION: u8 = 4;

#[derive(Debug, Error)]
pub enum PacketError {
    #[error("empty frame")]
    Empty,
    #[error("unknown engine.io packet type {0:?}")]
    UnknownEngineType(char),
    #[error("unknown socket.io packet type {0:?}")]
    UnknownSocketType(char),
    #[error("invalid packet payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Parameters the server announces in its `open` packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    pub ping_interval: u64,
    pub ping_timeout: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_payload: Option<u64>,
}

/// Outer transport packet.
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(Handshake),
    Close,
    Ping(String),
    Pong(String),
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    pub fn decode(frame: &str) -> Result<Self, PacketError> {
        let mut chars = frame.chars();
        let kind = chars.next().ok_or(PacketError::Empty)?;
        let body = chars.as_str();
        Ok(match kind {
            '0' => EnginePacket::Open(serde_json::from_str(body)?),
            '1' => EnginePacket::Close,
            '2' => EnginePacket::Ping(body.to_string()),
            '3' => EnginePacket::Pong(body.to_string()),
            '4' => EnginePacket::Message(body.to_string()),
            '5' => EnginePacket::Upgrade,
            '6' => EnginePacket::Noop,
            other => return Err(PacketError::UnknownEngineType(other)),
        })
    }

    pub fn encode(&self) -> String {
        match self {
            EnginePacket::Open(handshake) => {
                // Handshake only holds strings and integers.
                format!("0{}", serde_json::to_string(handshake).unwrap_or_default())
            }
            EnginePacket::Close => "1".to_string(),
            EnginePacket::Ping(body) => format!("2{body}"),
            EnginePacket::Pong(body) => format!("3{body}"),
            EnginePacket::Message(body) => format!("4{body}"),
            EnginePacket::Upgrade => "5".to_string(),
            EnginePacket::Noop => "6".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketPacketKind {
    Connect,
    Disconnect,
    Event,
    Ack,
    ConnectError,
    BinaryEvent,
    BinaryAck,
}

impl SocketPacketKind {
    fn from_char(c: char) -> Result<Self, PacketError> {
        Ok(match c {
            '0' => SocketPacketKind::Connect,
            '1' => SocketPacketKind::Disconnect,
            '2' => SocketPacketKind::Event,
            '3' => SocketPacketKind::Ack,
            '4' => SocketPacketKind::ConnectError,
            '5' => SocketPacketKind::BinaryEvent,
            '6' => SocketPacketKind::BinaryAck,
            other => return Err(PacketError::UnknownSocketType(other)),
        })
    }

    fn as_char(self) -> char {
        match self {
            SocketPacketKind::Connect => '0',
            SocketPacketKind::Disconnect => '1',
            SocketPacketKind::Event => '2',
            SocketPacketKind::Ack => '3',
            SocketPacketKind::ConnectError => '4',
            SocketPacketKind::BinaryEvent => '5',
            SocketPacketKind::BinaryAck => '6',
        }
    }

    pub fn is_binary(self) -> bool {
        matches!(
            self,
            SocketPacketKind::BinaryEvent | SocketPacketKind::BinaryAck
        )
    }
}

/// Namespaced packet carried inside an Engine.IO `message`.
#[derive(Debug, Clone, PartialEq)]
pub struct SocketPacket {
    pub kind: SocketPacketKind,
    pub namespace: String,
    pub ack_id: Option<u64>,
    pub data: Option<Value>,
}

impl SocketPacket {
    pub fn connect(namespace: &str) -> Self {
        Self {
            kind: SocketPacketKind::Connect,
            namespace: namespace.to_string(),
            ack_id: None,
            data: None,
        }
    }

    pub fn disconnect(namespace: &str) -> Self {
        Self {
            kind: SocketPacketKind::Disconnect,
            namespace: namespace.to_string(),
            ack_id: None,
            data: None,
        }
    }

    pub fn event(namespace: &str, name: &str, payload: Value) -> Self {
        Self {
            kind: SocketPacketKind::Event,
            namespace: namespace.to_string(),
            ack_id: None,
            data: Some(Value::Array(vec![Value::String(name.to_string()), payload])),
        }
    }

    pub fn decode(body: &str) -> Result<Self, PacketError> {
        let mut chars = body.chars();
        let kind = SocketPacketKind::from_char(chars.next().ok_or(PacketError::Empty)?)?;
        let mut rest = chars.as_str();

        if kind.is_binary() {
            // `<attachments>-` prefix; the attachments themselves never arrive as text.
            if let Some(idx) = rest.find('-') {
                if rest[..idx].bytes().all(|b| b.is_ascii_digit()) {
                    rest = &rest[idx + 1..];
                }
            }
        }

        let namespace = if rest.starts_with('/') {
            match rest.find(',') {
                Some(idx) => {
                    let ns = &rest[..idx];
                    rest = &rest[idx + 1..];
                    ns.to_string()
                }
                None => {
                    let ns = rest.to_string();
                    rest = "";
                    ns
                }
            }
        } else {
            "/".to_string()
        };

        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        let ack_id = if digits > 0 {
            let id = rest[..digits].parse().ok();
            rest = &rest[digits..];
            id
        } else {
            None
        };

        let data = if rest.is_empty() {
            None
        } else {
            Some(serde_json::from_str(rest)?)
        };

        Ok(Self {
            kind,
            namespace,
            ack_id,
            data,
        })
    }

    pub fn encode(&self) -> String {
        let mut out = String::new();
        out.push(self.kind.as_char());
        if self.namespace != "/" {
            out.push_str(&self.namespace);
            out.push(',');
        }
        if let Some(id) = self.ack_id {
            out.push_str(&id.to_string());
        }
        if let Some(data) = &self.data {
            out.push_str(&data.to_string());
        }
        out
    }

    /// For event packets: the event name and its arguments.
    pub fn into_event(self) -> Option<(String, Vec<Value>)> {
        if self.kind != SocketPacketKind::Event {
            return None;
        }
        let mut items = match self.data? {
            Value::Array(items) => items,
            _ => return None,
        };
        if items.is_empty() {
            return None;
        }
        let name = match items.remove(0) {
            Value::String(name) => name,
            _ => return None,
        };
        Some((name, items))
    }

    /// Human readable reason carried by a `connect_error` packet.
    pub fn error_message(&self) -> Option<String> {
        let data = self.data.as_ref()?;
        data.get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| data.as_str().map(str::to_string))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_open_handshake() {
        let frame = r#"0{"sid":"lv_VI97HAXpY6yYWAAAC","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;
        match EnginePacket::decode(frame).expect("decode") {
            EnginePacket::Open(handshake) => {
                assert_eq!(handshake.sid, "lv_VI97HAXpY6yYWAAAC");
                assert_eq!(handshake.ping_interval, 25000);
                assert_eq!(handshake.max_payload, Some(1_000_000));
            }
            other => panic!("unexpected packet: {:?}", other),
        }
    }

    #[test]
    fn ping_is_answered_with_matching_pong() {
        let ping = EnginePacket::decode("2").expect("decode");
        assert_eq!(ping, EnginePacket::Ping(String::new()));
        assert_eq!(EnginePacket::Pong(String::new()).encode(), "3");
    }

    #[test]
    fn rejects_empty_and_unknown_frames() {
        assert!(matches!(EnginePacket::decode(""), Err(PacketError::Empty)));
        assert!(matches!(
            EnginePacket::decode("9"),
            Err(PacketError::UnknownEngineType('9'))
        ));
    }

    #[test]
    fn namespace_connect_encodes_with_trailing_comma() {
        let packet = SocketPacket::connect("/whatsapp");
        assert_eq!(
            EnginePacket::Message(packet.encode()).encode(),
            "40/whatsapp,"
        );
        assert_eq!(SocketPacket::connect("/").encode(), "0");
    }

    #[test]
    fn decodes_namespaced_event() {
        let packet =
            SocketPacket::decode(r#"2/whatsapp,["session-update",{"id":"a","status":"ready"}]"#)
                .expect("decode");
        assert_eq!(packet.kind, SocketPacketKind::Event);
        assert_eq!(packet.namespace, "/whatsapp");
        assert_eq!(packet.ack_id, None);

        let (name, args) = packet.into_event().expect("event");
        assert_eq!(name, "session-update");
        assert_eq!(args, vec![json!({"id": "a", "status": "ready"})]);
    }

    #[test]
    fn decodes_ack_id_and_default_namespace() {
        let packet = SocketPacket::decode(r#"212["ping-me"]"#).expect("decode");
        assert_eq!(packet.namespace, "/");
        assert_eq!(packet.ack_id, Some(12));
        assert_eq!(packet.into_event().map(|(n, _)| n).as_deref(), Some("ping-me"));
    }

    #[test]
    fn decodes_namespace_without_payload() {
        let packet = SocketPacket::decode("1/whatsapp,").expect("decode");
        assert_eq!(packet.kind, SocketPacketKind::Disconnect);
        assert_eq!(packet.namespace, "/whatsapp");
        assert!(packet.data.is_none());

        let bare = SocketPacket::decode("0/whatsapp").expect("decode");
        assert_eq!(bare.namespace, "/whatsapp");
    }

    #[test]
    fn connect_error_exposes_message() {
        let packet = SocketPacket::decode(r#"4/whatsapp,{"message":"Not authorized"}"#)
            .expect("decode");
        assert_eq!(packet.kind, SocketPacketKind::ConnectError);
        assert_eq!(packet.error_message().as_deref(), Some("Not authorized"));
    }

    #[test]
    fn event_encoding_matches_wire_format() {
        let packet = SocketPacket::event("/whatsapp", "add-new-session", json!({"id": "a"}));
        assert_eq!(
            EnginePacket::Message(packet.encode()).encode(),
            r#"42/whatsapp,["add-new-session",{"id":"a"}]"#
        );
    }

    #[test]
    fn binary_event_prefix_is_skipped() {
        let packet = SocketPacket::decode(r#"51-/whatsapp,["file",{"_placeholder":true,"num":0}]"#)
            .expect("decode");
        assert_eq!(packet.kind, SocketPacketKind::BinaryEvent);
        assert_eq!(packet.namespace, "/whatsapp");
        assert!(packet.into_event().is_none());
    }
}
