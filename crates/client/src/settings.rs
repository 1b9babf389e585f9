//! Persisted operator settings: backend URL and login state.

use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:3001";
pub const DEFAULT_DASHBOARD_URL: &str = "http://localhost:3000";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings io: {0}")]
    Io(#[from] io::Error),
    #[error("invalid settings file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("could not serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default)]
    pub logged_in: bool,
}

impl Settings {
    /// A missing file is the same as an empty one.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        match std::fs::read_to_string(path) {
            Ok(raw) => Ok(toml::from_str(&raw)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    pub fn sign_in(&mut self, token: String) {
        self.token = Some(token);
        self.logged_in = true;
    }

    pub fn sign_out(&mut self) {
        self.token = None;
        self.logged_in = false;
    }

    /// Token to present to the backend, only while logged in.
    pub fn active_token(&self) -> Option<&str> {
        self.token.as_deref().filter(|_| self.logged_in)
    }

    /// Explicit value (flag or env) > saved value > default.
    pub fn resolve_backend_url(&self, explicit: Option<&str>) -> String {
        explicit
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .or(self.backend_url.as_deref())
            .unwrap_or(DEFAULT_BACKEND_URL)
            .to_string()
    }
}
