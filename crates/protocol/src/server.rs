//! Backend → dashboard events

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

use crate::types::*;

/// Event names the dashboard understands. Anything else is ignored.
pub const INBOUND_EVENTS: &[&str] = &[
    "initial-state",
    "session-update",
    "session-removed",
    "log-message",
    "initial-chats",
    "chat-update",
    "messages-update",
    "new-message",
];

/// Events pushed by the backend over the `/whatsapp` namespace.
///
/// On the wire an event is `["<name>", <payload>]`; the adjacent tagging here
/// mirrors that pair so decoding is a single `from_value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    // Sessions
    InitialState(Vec<Session>),
    SessionUpdate(SessionUpdate),
    SessionRemoved(SessionRef),
    LogMessage {
        id: String,
        #[serde(alias = "log")]
        message: String,
    },

    // Inbox
    InitialChats {
        id: String,
        chats: Vec<Chat>,
    },
    ChatUpdate {
        id: String,
        chat: Chat,
    },
    MessagesUpdate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        chat_id: WaId,
        messages: Vec<ChatMessage>,
    },
    NewMessage {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        chat_id: WaId,
        message: ChatMessage,
    },
}

impl ServerEvent {
    /// Decode a Socket.IO event. Returns `Ok(None)` for event names we don't handle.
    pub fn from_socket(name: &str, args: Vec<Value>) -> Result<Option<Self>, serde_json::Error> {
        if !INBOUND_EVENTS.contains(&name) {
            return Ok(None);
        }
        let data = args.into_iter().next().unwrap_or(Value::Null);
        serde_json::from_value(json!({ "event": name, "data": data })).map(Some)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::InitialState(_) => "initial-state",
            ServerEvent::SessionUpdate(_) => "session-update",
            ServerEvent::SessionRemoved(_) => "session-removed",
            ServerEvent::LogMessage { .. } => "log-message",
            ServerEvent::InitialChats { .. } => "initial-chats",
            ServerEvent::ChatUpdate { .. } => "chat-update",
            ServerEvent::MessagesUpdate { .. } => "messages-update",
            ServerEvent::NewMessage { .. } => "new-message",
        }
    }

    /// Session the event is about, when the payload names one.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            ServerEvent::InitialState(_) => None,
            ServerEvent::SessionUpdate(update) => Some(&update.id),
            ServerEvent::SessionRemoved(session) => Some(&session.id),
            ServerEvent::LogMessage { id, .. }
            | ServerEvent::InitialChats { id, .. }
            | ServerEvent::ChatUpdate { id, .. } => Some(id),
            ServerEvent::MessagesUpdate { id, .. } | ServerEvent::NewMessage { id, .. } => {
                id.as_deref()
            }
        }
    }
}

/// Target of `session-removed`; the backend sends either `"id"` or `{ "id": "..." }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionRef {
    pub id: String,
}

impl<'de> Deserialize<'de> for SessionRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Bare(String),
            Object { id: String },
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Bare(id) | Repr::Object { id } => SessionRef { id },
        })
    }
}
