//! wadash Protocol
//!
//! Shared types for communication between the WhatsApp automation backend and
//! the dashboard. Events are JSON payloads carried over Socket.IO.

use uuid::Uuid;

// Re-exports
pub mod client;
pub mod packet;
pub mod server;
pub mod types;

pub use client::ClientCommand;
pub use packet::{EnginePacket, Handshake, PacketError, SocketPacket, SocketPacketKind};
pub use server::ServerEvent;
pub use types::*;

/// Socket.IO namespace the backend serves session traffic on.
pub const DEFAULT_NAMESPACE: &str = "/whatsapp";

/// Generate a new unique ID
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}
