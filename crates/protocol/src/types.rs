//! Core types shared across the protocol

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Lifecycle status of a WhatsApp account connection, as reported by the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionStatus {
    #[default]
    Initializing,
    QrReceived,
    Authenticated,
    Ready,
    Disconnected,
    AuthFailure,
    CodeReceived,
    Error,
    /// A status this client does not know yet. Kept so the rest of the
    /// snapshot still applies.
    #[serde(other)]
    Unknown,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Initializing => "initializing",
            SessionStatus::QrReceived => "qr-received",
            SessionStatus::Authenticated => "authenticated",
            SessionStatus::Ready => "ready",
            SessionStatus::Disconnected => "disconnected",
            SessionStatus::AuthFailure => "auth-failure",
            SessionStatus::CodeReceived => "code-received",
            SessionStatus::Error => "error",
            SessionStatus::Unknown => "unknown",
        }
    }

    /// Whether the account is waiting for the operator to scan or type something.
    pub fn awaiting_login(&self) -> bool {
        matches!(self, SessionStatus::QrReceived | SessionStatus::CodeReceived)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A WhatsApp identifier in its serialized form (`628123@c.us`, `ABCD@g.us`, ...).
///
/// The backend forwards whatsapp-web.js objects as-is, so an id arrives either as a
/// plain string or as `{ "server": .., "user": .., "_serialized": .. }`. Both decode
/// to the `_serialized` string; encoding always produces the plain string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WaId(String);

impl WaId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The part before `@`, usually the phone number.
    pub fn user(&self) -> &str {
        self.0.split('@').next().unwrap_or(&self.0)
    }

    pub fn is_group(&self) -> bool {
        self.0.ends_with("@g.us")
    }
}

impl fmt::Display for WaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WaId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for WaId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for WaId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl Serialize for WaId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for WaId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Plain(String),
            Structured {
                #[serde(rename = "_serialized")]
                serialized: String,
            },
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Plain(id) => WaId(id),
            Repr::Structured { serialized } => WaId(serialized),
        })
    }
}

/// Account details the backend learns once a session is authenticated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountInfo {
    /// Display name on the phone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pushname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wid: Option<WaId>,
}

/// View-model for one managed WhatsApp account connection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    #[serde(default)]
    pub status: SessionStatus,
    /// QR payload, or a `data:image/png;base64,...` URL depending on the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr: Option<String>,
    #[serde(default, alias = "code", skip_serializing_if = "Option::is_none")]
    pub pairing_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<AccountInfo>,
}

impl Session {
    /// Build a record from a partial update when nothing is known about the session yet.
    pub fn from_update(update: SessionUpdate) -> Self {
        let mut session = Session {
            id: update.id.clone(),
            ..Default::default()
        };
        session.apply(update);
        session
    }

    /// Shallow merge: every field present in `update` replaces ours, including
    /// explicit nulls; absent fields are left untouched.
    pub fn apply(&mut self, update: SessionUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(qr) = update.qr {
            self.qr = qr;
        }
        if let Some(code) = update.pairing_code {
            self.pairing_code = code;
        }
        if let Some(info) = update.info {
            self.info = info;
        }
    }

    pub fn display_name(&self) -> Option<&str> {
        self.info.as_ref().and_then(|i| i.pushname.as_deref())
    }
}

/// Partial session record carried by `session-update`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUpdate {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SessionStatus>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub qr: Option<Option<String>>,
    #[serde(
        default,
        alias = "code",
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub pairing_code: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub info: Option<Option<AccountInfo>>,
}

/// Distinguishes an absent key (`None`, via `default`) from an explicit `null` (`Some(None)`).
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// A conversation thread as the backend lists it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: WaId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default)]
    pub unread_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<ChatMessage>,
}

impl Chat {
    pub fn title(&self) -> &str {
        if self.name.is_empty() {
            self.id.user()
        } else {
            &self.name
        }
    }
}

/// A single WhatsApp message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: WaId,
    #[serde(default)]
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default)]
    pub from_me: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub has_media: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack: Option<i32>,
}

/// A phone-book entry stored by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub id: String,
    pub phone_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_valid: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Fields to change on an address (`PUT`); unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_valid: Option<bool>,
}

impl AddressUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.phone_number.is_none() && self.is_valid.is_none()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Pagination and filtering for address listings, sent as query parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressQuery {
    pub page: u32,
    pub limit: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<SortOrder>,
}

impl Default for AddressQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 10,
            search: None,
            sort_by: None,
            sort_order: None,
        }
    }
}

/// One page of a paginated listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub total_pages: u32,
}
