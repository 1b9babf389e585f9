//! Pure event reducer
//!
//! Folds backend events into the locally cached dashboard state:
//! `apply(state, event) -> change`. No IO, no async, no locking.
//! The backend is the only source of truth; nothing here validates
//! status transitions or second-guesses what it asserted.

use tracing::debug;

use wadash_protocol::{ServerEvent, WaId};

use crate::inbox::Inbox;
use crate::sessions::SessionBook;

/// What a single applied event touched, so observers can re-render narrowly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    /// The whole session map was replaced.
    Sessions,
    Session { id: String },
    SessionRemoved { id: String },
    Log { id: String },
    Chats { session_id: String },
    /// `session_id` is set when the backend said which session the chat is on.
    Messages {
        session_id: Option<String>,
        chat_id: WaId,
    },
    /// The event was valid but changed nothing (e.g. a duplicate message).
    Unchanged,
}

#[derive(Debug, Clone, Default)]
pub struct DashboardState {
    /// Count of events that changed something.
    pub revision: u64,
    sessions: SessionBook,
    inbox: Inbox,
}

impl DashboardState {
    pub fn new(log_capacity: usize) -> Self {
        Self {
            revision: 0,
            sessions: SessionBook::new(log_capacity),
            inbox: Inbox::default(),
        }
    }

    pub fn sessions(&self) -> &SessionBook {
        &self.sessions
    }

    pub fn inbox(&self) -> &Inbox {
        &self.inbox
    }

    pub fn apply(&mut self, event: ServerEvent) -> StoreChange {
        let change = match event {
            ServerEvent::InitialState(sessions) => {
                self.sessions.seed(sessions);
                StoreChange::Sessions
            }
            ServerEvent::SessionUpdate(update) => {
                let id = self.sessions.merge(update).id.clone();
                StoreChange::Session { id }
            }
            ServerEvent::SessionRemoved(target) => {
                self.sessions.remove(&target.id);
                StoreChange::SessionRemoved { id: target.id }
            }
            ServerEvent::LogMessage { id, message } => {
                self.sessions.append_log(&id, message);
                StoreChange::Log { id }
            }
            ServerEvent::InitialChats { id, chats } => {
                self.inbox.replace_chats(&id, chats);
                StoreChange::Chats { session_id: id }
            }
            ServerEvent::ChatUpdate { id, chat } => {
                self.inbox.upsert_chat(&id, chat);
                StoreChange::Chats { session_id: id }
            }
            ServerEvent::MessagesUpdate {
                id,
                chat_id,
                messages,
            } => {
                self.inbox.replace_messages(chat_id.clone(), messages);
                StoreChange::Messages {
                    session_id: id,
                    chat_id,
                }
            }
            ServerEvent::NewMessage {
                id,
                chat_id,
                message,
            } => {
                let message_id = message.id.clone();
                if self.inbox.push_message(chat_id.clone(), message) {
                    StoreChange::Messages {
                        session_id: id,
                        chat_id,
                    }
                } else {
                    debug!(
                        component = "state",
                        event = "state.message.duplicate",
                        chat_id = %chat_id,
                        message_id = %message_id,
                        "Ignoring duplicate message"
                    );
                    StoreChange::Unchanged
                }
            }
        };

        if change != StoreChange::Unchanged {
            self.revision += 1;
        }
        change
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wadash_protocol::{SessionStatus, SessionUpdate};

    fn event(name: &str, payload: serde_json::Value) -> ServerEvent {
        ServerEvent::from_socket(name, vec![payload])
            .expect("decode")
            .expect("known event")
    }

    #[test]
    fn qr_then_ready_ends_ready() {
        let mut state = DashboardState::default();
        state.apply(event("session-update", json!({"id": "a", "status": "qr-received", "qr": "2@q"})));
        state.apply(event("session-update", json!({"id": "a", "status": "ready"})));

        let session = state.sessions().get("a").expect("session a");
        assert_eq!(session.status, SessionStatus::Ready);
        assert_eq!(session.qr.as_deref(), Some("2@q"));
        assert_eq!(state.revision, 2);
    }

    #[test]
    fn removal_after_update_wins() {
        let mut state = DashboardState::default();
        state.apply(ServerEvent::SessionUpdate(SessionUpdate {
            id: "a".into(),
            status: Some(SessionStatus::Ready),
            ..Default::default()
        }));
        let change = state.apply(event("session-removed", json!({"id": "a"})));

        assert_eq!(change, StoreChange::SessionRemoved { id: "a".into() });
        assert!(!state.sessions().contains("a"));
    }

    #[test]
    fn update_after_removal_recreates_session() {
        let mut state = DashboardState::default();
        state.apply(event("session-removed", json!("a")));
        state.apply(event("session-update", json!({"id": "a", "status": "disconnected"})));
        assert_eq!(
            state.sessions().get("a").map(|s| s.status),
            Some(SessionStatus::Disconnected)
        );
    }

    #[test]
    fn initial_state_replaces_sessions() {
        let mut state = DashboardState::default();
        state.apply(event("session-update", json!({"id": "old", "status": "ready"})));
        let change = state.apply(event(
            "initial-state",
            json!([{"id": "x", "status": "initializing"}, {"id": "y", "status": "ready"}]),
        ));
        assert_eq!(change, StoreChange::Sessions);
        let ids: Vec<_> = state.sessions().iter().map(|s| s.id.clone()).collect();
        assert_eq!(ids, vec!["x", "y"]);
    }

    #[test]
    fn log_lines_accumulate_per_session() {
        let mut state = DashboardState::new(10);
        state.apply(event("log-message", json!({"id": "a", "message": "QR generated"})));
        state.apply(event("log-message", json!({"id": "a", "message": "Client ready"})));

        let lines: Vec<_> = state
            .sessions()
            .logs("a")
            .expect("logs for a")
            .iter()
            .collect();
        assert_eq!(lines, vec!["QR generated", "Client ready"]);
    }

    #[test]
    fn duplicate_new_message_is_unchanged() {
        let mut state = DashboardState::default();
        let payload = json!({
            "chatId": "628222@c.us",
            "message": {"id": "m1", "body": "halo", "fromMe": false}
        });

        let first = state.apply(event("new-message", payload.clone()));
        let second = state.apply(event("new-message", payload));

        assert_eq!(
            first,
            StoreChange::Messages {
                session_id: None,
                chat_id: WaId::from("628222@c.us")
            }
        );
        assert_eq!(second, StoreChange::Unchanged);
        assert_eq!(state.inbox().messages("628222@c.us").len(), 1);
        assert_eq!(state.revision, 1);
    }

    #[test]
    fn chat_events_fold_into_session_lists() {
        let mut state = DashboardState::default();
        state.apply(event(
            "initial-chats",
            json!({"id": "s", "chats": [{"id": "1@c.us", "name": "Ana"}, {"id": "2@c.us", "name": "Budi"}]}),
        ));
        let change = state.apply(event(
            "chat-update",
            json!({"id": "s", "chat": {"id": "2@c.us", "name": "Budi", "unreadCount": 3}}),
        ));

        assert_eq!(change, StoreChange::Chats { session_id: "s".into() });
        let chats = state.inbox().chats("s");
        assert_eq!(chats.len(), 2);
        assert_eq!(chats[1].unread_count, 3);
    }

    #[test]
    fn messages_update_refreshes_chat() {
        let mut state = DashboardState::default();
        state.apply(event(
            "messages-update",
            json!({"id": "s", "chatId": "1@c.us", "messages": [{"id": "a"}, {"id": "b"}]}),
        ));
        state.apply(event(
            "messages-update",
            json!({"id": "s", "chatId": "1@c.us", "messages": [{"id": "c"}]}),
        ));
        let ids: Vec<_> = state
            .inbox()
            .messages("1@c.us")
            .iter()
            .map(|m| m.id.as_str())
            .collect();
        assert_eq!(ids, vec!["c"]);
    }

    #[test]
    fn message_changes_name_their_session() {
        let mut state = DashboardState::default();
        let change = state.apply(event(
            "new-message",
            json!({"id": "sales", "chatId": "1@c.us", "message": {"id": "m1"}}),
        ));
        assert_eq!(
            change,
            StoreChange::Messages {
                session_id: Some("sales".into()),
                chat_id: WaId::from("1@c.us")
            }
        );
    }
}
