//! Dashboard → backend commands

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default number of messages requested when a chat is opened.
pub const DEFAULT_MESSAGE_LIMIT: u32 = 50;

/// Commands emitted to the backend over the `/whatsapp` namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ClientCommand {
    // Session management
    AddNewSession {
        id: String,
    },
    RequestLoginCode {
        id: String,
        phone_number: String,
    },
    LogoutSession {
        id: String,
    },

    // Messaging
    SendMessage {
        id: String,
        to: String,
        message: String,
    },

    // Inbox
    RequestChats {
        id: String,
    },
    RequestMessages {
        id: String,
        chat_id: String,
        limit: u32,
    },
}

impl ClientCommand {
    pub fn name(&self) -> &'static str {
        match self {
            ClientCommand::AddNewSession { .. } => "add-new-session",
            ClientCommand::RequestLoginCode { .. } => "request-login-code",
            ClientCommand::LogoutSession { .. } => "logout-session",
            ClientCommand::SendMessage { .. } => "send-message",
            ClientCommand::RequestChats { .. } => "request-chats",
            ClientCommand::RequestMessages { .. } => "request-messages",
        }
    }

    pub fn session_id(&self) -> &str {
        match self {
            ClientCommand::AddNewSession { id }
            | ClientCommand::RequestLoginCode { id, .. }
            | ClientCommand::LogoutSession { id }
            | ClientCommand::SendMessage { id, .. }
            | ClientCommand::RequestChats { id }
            | ClientCommand::RequestMessages { id, .. } => id,
        }
    }

    /// Split into the Socket.IO event name and its single payload argument.
    pub fn into_event(self) -> Result<(&'static str, Value), serde_json::Error> {
        let name = self.name();
        let mut value = serde_json::to_value(&self)?;
        let payload = value
            .get_mut("data")
            .map(Value::take)
            .unwrap_or(Value::Null);
        Ok((name, payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_login_code_uses_camel_case_payload() {
        let (name, payload) = ClientCommand::RequestLoginCode {
            id: "sess-1".into(),
            phone_number: "628111".into(),
        }
        .into_event()
        .expect("encode");

        assert_eq!(name, "request-login-code");
        assert_eq!(payload, json!({"id": "sess-1", "phoneNumber": "628111"}));
    }

    #[test]
    fn request_messages_carries_chat_and_limit() {
        let (name, payload) = ClientCommand::RequestMessages {
            id: "sess-1".into(),
            chat_id: "628222@c.us".into(),
            limit: DEFAULT_MESSAGE_LIMIT,
        }
        .into_event()
        .expect("encode");

        assert_eq!(name, "request-messages");
        assert_eq!(
            payload,
            json!({"id": "sess-1", "chatId": "628222@c.us", "limit": 50})
        );
    }

    #[test]
    fn send_message_payload() {
        let cmd = ClientCommand::SendMessage {
            id: "sess-1".into(),
            to: "628333".into(),
            message: "hello".into(),
        };
        assert_eq!(cmd.session_id(), "sess-1");
        let (name, payload) = cmd.into_event().expect("encode");
        assert_eq!(name, "send-message");
        assert_eq!(
            payload,
            json!({"id": "sess-1", "to": "628333", "message": "hello"})
        );
    }

    #[test]
    fn name_matches_serde_tag() {
        let cmd = ClientCommand::LogoutSession { id: "x".into() };
        let value = serde_json::to_value(&cmd).expect("serialize");
        assert_eq!(value["event"], cmd.name());
    }
}
