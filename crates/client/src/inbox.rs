//! Chats per session and messages per chat.
//!
//! Lists sit behind `Arc` so cloning an `Inbox` for a snapshot copies only
//! the maps. Writes go through `Arc::make_mut` and copy one list at most.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use wadash_protocol::{Chat, ChatMessage, WaId};

/// Outcome of folding a single `chat-update` into the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatUpsert {
    Replaced,
    Appended,
}

/// Messages of one chat with an index of their ids.
#[derive(Debug, Clone, Default)]
struct Thread {
    messages: Vec<ChatMessage>,
    ids: HashSet<WaId>,
}

impl Thread {
    fn from_messages(messages: Vec<ChatMessage>) -> Self {
        let ids = messages.iter().map(|m| m.id.clone()).collect();
        Self { messages, ids }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Inbox {
    chats: HashMap<String, Arc<Vec<Chat>>>,
    messages: HashMap<WaId, Arc<Thread>>,
}

impl Inbox {
    /// `initial-chats`: the backend's list wins outright.
    pub fn replace_chats(&mut self, session_id: &str, chats: Vec<Chat>) {
        self.chats.insert(session_id.to_string(), Arc::new(chats));
    }

    /// `chat-update`: replace the chat with the same id in place, else append.
    pub fn upsert_chat(&mut self, session_id: &str, chat: Chat) -> ChatUpsert {
        let chats = Arc::make_mut(self.chats.entry(session_id.to_string()).or_default());
        match chats.iter_mut().find(|existing| existing.id == chat.id) {
            Some(existing) => {
                *existing = chat;
                ChatUpsert::Replaced
            }
            None => {
                chats.push(chat);
                ChatUpsert::Appended
            }
        }
    }

    /// `messages-update`: bulk refresh of one chat.
    pub fn replace_messages(&mut self, chat_id: WaId, messages: Vec<ChatMessage>) {
        self.messages
            .insert(chat_id, Arc::new(Thread::from_messages(messages)));
    }

    /// `new-message`: append unless a message with the same id is already stored.
    /// Returns whether the message was inserted.
    pub fn push_message(&mut self, chat_id: WaId, message: ChatMessage) -> bool {
        if self
            .messages
            .get(&chat_id)
            .is_some_and(|thread| thread.ids.contains(&message.id))
        {
            return false;
        }
        let thread = Arc::make_mut(self.messages.entry(chat_id).or_default());
        thread.ids.insert(message.id.clone());
        thread.messages.push(message);
        true
    }

    pub fn chats(&self, session_id: &str) -> &[Chat] {
        self.chats
            .get(session_id)
            .map(|chats| chats.as_slice())
            .unwrap_or(&[])
    }

    pub fn chat(&self, session_id: &str, chat_id: &str) -> Option<&Chat> {
        self.chats(session_id)
            .iter()
            .find(|chat| chat.id.as_str() == chat_id)
    }

    /// Messages of a chat in arrival order.
    pub fn messages(&self, chat_id: &str) -> &[ChatMessage] {
        self.messages
            .get(chat_id)
            .map(|thread| thread.messages.as_slice())
            .unwrap_or(&[])
    }

    pub fn unread_total(&self, session_id: &str) -> u32 {
        self.chats(session_id).iter().map(|c| c.unread_count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat(id: &str, name: &str, unread: u32) -> Chat {
        Chat {
            id: WaId::from(id),
            name: name.to_string(),
            is_group: false,
            unread_count: unread,
            timestamp: None,
            archived: false,
            last_message: None,
        }
    }

    fn message(id: &str, body: &str) -> ChatMessage {
        ChatMessage {
            id: WaId::from(id),
            body: body.to_string(),
            from: None,
            to: None,
            from_me: false,
            timestamp: None,
            kind: Some("chat".into()),
            has_media: false,
            ack: None,
        }
    }

    #[test]
    fn initial_chats_replace_never_merge() {
        let mut inbox = Inbox::default();
        inbox.replace_chats("s", vec![chat("1@c.us", "old", 0), chat("2@c.us", "two", 0)]);
        inbox.replace_chats("s", vec![chat("3@c.us", "three", 1)]);

        let ids: Vec<_> = inbox.chats("s").iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["3@c.us"]);
    }

    #[test]
    fn initial_chats_only_touch_their_session() {
        let mut inbox = Inbox::default();
        inbox.replace_chats("s1", vec![chat("1@c.us", "one", 0)]);
        inbox.replace_chats("s2", vec![]);
        assert_eq!(inbox.chats("s1").len(), 1);
        assert!(inbox.chats("s2").is_empty());
    }

    #[test]
    fn chat_update_replaces_in_place_or_appends() {
        let mut inbox = Inbox::default();
        inbox.replace_chats("s", vec![chat("1@c.us", "one", 0), chat("2@c.us", "two", 0)]);

        assert_eq!(
            inbox.upsert_chat("s", chat("1@c.us", "one renamed", 4)),
            ChatUpsert::Replaced
        );
        assert_eq!(
            inbox.upsert_chat("s", chat("9@c.us", "nine", 1)),
            ChatUpsert::Appended
        );

        let names: Vec<_> = inbox.chats("s").iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["one renamed", "two", "nine"]);
        assert_eq!(inbox.unread_total("s"), 5);
        assert_eq!(
            inbox.chat("s", "9@c.us").map(|c| c.title()),
            Some("nine")
        );
    }

    #[test]
    fn chat_update_for_unknown_session_starts_a_list() {
        let mut inbox = Inbox::default();
        inbox.upsert_chat("new", chat("1@c.us", "one", 0));
        assert_eq!(inbox.chats("new").len(), 1);
    }

    #[test]
    fn duplicate_message_ids_are_stored_once() {
        let mut inbox = Inbox::default();
        let chat_id = WaId::from("1@c.us");
        assert!(inbox.push_message(chat_id.clone(), message("m1", "hi")));
        assert!(!inbox.push_message(chat_id.clone(), message("m1", "hi again")));

        let stored = inbox.messages("1@c.us");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].body, "hi");
    }

    #[test]
    fn messages_keep_arrival_order() {
        let mut inbox = Inbox::default();
        let chat_id = WaId::from("1@c.us");
        let mut late = message("m2", "second");
        late.timestamp = Some(1);
        let mut early = message("m1", "first");
        early.timestamp = Some(100);

        inbox.push_message(chat_id.clone(), late);
        inbox.push_message(chat_id, early);

        let bodies: Vec<_> = inbox.messages("1@c.us").iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["second", "first"]);
    }

    #[test]
    fn messages_update_replaces_whole_list() {
        let mut inbox = Inbox::default();
        let chat_id = WaId::from("1@c.us");
        inbox.push_message(chat_id.clone(), message("m1", "one"));
        inbox.replace_messages(chat_id.clone(), vec![message("m7", "seven"), message("m8", "eight")]);

        let ids: Vec<_> = inbox.messages("1@c.us").iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m7", "m8"]);

        // De-dup applies against the refreshed list.
        assert!(inbox.push_message(chat_id.clone(), message("m1", "one")));
        assert_eq!(inbox.messages("1@c.us").len(), 3);
        assert!(!inbox.push_message(chat_id, message("m8", "eight again")));
    }

    #[test]
    fn clones_are_unaffected_by_later_writes() {
        let mut inbox = Inbox::default();
        let chat_id = WaId::from("1@c.us");
        inbox.replace_chats("s", vec![chat("1@c.us", "one", 0)]);
        inbox.push_message(chat_id.clone(), message("m1", "one"));

        let snapshot = inbox.clone();
        inbox.push_message(chat_id, message("m2", "two"));
        inbox.upsert_chat("s", chat("1@c.us", "one", 7));

        assert_eq!(snapshot.messages("1@c.us").len(), 1);
        assert_eq!(snapshot.unread_total("s"), 0);
        assert_eq!(inbox.messages("1@c.us").len(), 2);
        assert_eq!(inbox.unread_total("s"), 7);
    }
}
