//! Command emitters
//!
//! Guarded pass-throughs to the backend. A command issued while the socket
//! is down is dropped, not queued; the `bool` result tells the caller
//! whether it went out.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tokio::sync::watch;
use tracing::{debug, warn};

use wadash_protocol::client::DEFAULT_MESSAGE_LIMIT;
use wadash_protocol::{ClientCommand, EnginePacket, SocketPacket};

use crate::connection::{ConnectionStatus, Link, Outbound};

/// Cheap to clone; follows the manager across reconnects.
#[derive(Clone)]
pub struct Emitter {
    link: Arc<ArcSwapOption<Link>>,
    status: watch::Receiver<ConnectionStatus>,
}

impl Emitter {
    pub(crate) fn new(
        link: Arc<ArcSwapOption<Link>>,
        status: watch::Receiver<ConnectionStatus>,
    ) -> Self {
        Self { link, status }
    }

    pub fn is_connected(&self) -> bool {
        *self.status.borrow() == ConnectionStatus::Connected
    }

    /// Emit if connected. Never errors; returns whether the frame was queued.
    pub fn emit(&self, command: ClientCommand) -> bool {
        let link = match self.link.load_full() {
            Some(link) if self.is_connected() => link,
            _ => {
                debug!(
                    component = "commands",
                    event = "commands.dropped",
                    command = command.name(),
                    session_id = %command.session_id(),
                    "Not connected, command dropped"
                );
                return false;
            }
        };

        let (name, payload) = match command.into_event() {
            Ok(event) => event,
            Err(e) => {
                warn!(
                    component = "commands",
                    event = "commands.encode_failed",
                    error = %e,
                    "Failed to encode command"
                );
                return false;
            }
        };

        let frame = EnginePacket::Message(SocketPacket::event(&link.namespace, name, payload).encode())
            .encode();
        match link.outbound.try_send(Outbound::Frame(frame)) {
            Ok(()) => {
                debug!(
                    component = "commands",
                    event = "commands.sent",
                    command = name,
                );
                true
            }
            Err(e) => {
                warn!(
                    component = "commands",
                    event = "commands.queue_failed",
                    command = name,
                    error = %e,
                    "Outbound queue full or closed"
                );
                false
            }
        }
    }

    pub fn add_new_session(&self, id: &str) -> bool {
        self.emit(ClientCommand::AddNewSession { id: id.to_string() })
    }

    pub fn send_message(&self, id: &str, to: &str, message: &str) -> bool {
        self.emit(ClientCommand::SendMessage {
            id: id.to_string(),
            to: to.to_string(),
            message: message.to_string(),
        })
    }

    pub fn request_login_code(&self, id: &str, phone_number: &str) -> bool {
        self.emit(ClientCommand::RequestLoginCode {
            id: id.to_string(),
            phone_number: phone_number.to_string(),
        })
    }

    pub fn logout_session(&self, id: &str) -> bool {
        self.emit(ClientCommand::LogoutSession { id: id.to_string() })
    }

    pub fn request_chats(&self, id: &str) -> bool {
        self.emit(ClientCommand::RequestChats { id: id.to_string() })
    }

    pub fn request_messages(&self, id: &str, chat_id: &str, limit: Option<u32>) -> bool {
        self.emit(ClientCommand::RequestMessages {
            id: id.to_string(),
            chat_id: chat_id.to_string(),
            limit: limit.unwrap_or(DEFAULT_MESSAGE_LIMIT),
        })
    }
}
