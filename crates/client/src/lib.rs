//! wadash client
//!
//! Mirrors backend-pushed WhatsApp session, chat and message state into
//! local view-models, and relays operator commands back over Socket.IO.

pub mod api;
pub mod commands;
pub mod connection;
pub mod error;
pub mod inbox;
pub mod logging;
pub mod notify;
pub mod paths;
pub mod sessions;
pub mod settings;
pub mod state;
pub mod store;

pub use api::{ApiClient, ApiError, AuthClient};
pub use commands::Emitter;
pub use connection::{ConnectionConfig, ConnectionStatus, SocketManager};
pub use error::ClientError;
pub use notify::{Notification, Notifier, Severity};
pub use settings::Settings;
pub use state::{DashboardState, StoreChange};
pub use store::StoreHandle;
