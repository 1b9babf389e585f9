//! REST calls: address book on the backend, password check on the dashboard.
//!
//! Every request carries a timeout. Cancellation is by dropping the future;
//! callers race calls against shutdown so no result lands after they are gone.

use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use wadash_protocol::{Address, AddressQuery, AddressUpdate, Page};

use crate::notify::Notification;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_ERROR_MESSAGE: &str = "Something went wrong. Please try again.";

const ADDRESS_PATH: &str = "/api/whatsapp/address";
const VERIFY_PASSWORD_PATH: &str = "/api/verify-password";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{message}")]
    Status { status: u16, message: String },

    #[error("invalid password")]
    InvalidPassword,

    #[error("{message}")]
    RateLimited {
        retry_after: Duration,
        message: String,
    },

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("invalid address id {0:?}")]
    InvalidId(String),
}

impl ApiError {
    pub fn rate_limited(retry_after: Duration) -> Self {
        ApiError::RateLimited {
            retry_after,
            message: countdown_message(retry_after),
        }
    }

    pub fn to_notification(&self, title: &str) -> Notification {
        Notification::error(title, self.to_string())
    }
}

/// "Too many attempts. Try again in 4m 30s."
pub fn countdown_message(retry_after: Duration) -> String {
    let secs = retry_after.as_secs();
    let remaining = match (secs / 60, secs % 60) {
        (0, 0) => return "Too many attempts. Try again shortly.".to_string(),
        (0, s) => format!("{s}s"),
        (m, 0) => format!("{m}m"),
        (m, s) => format!("{m}m {s}s"),
    };
    format!("Too many attempts. Try again in {remaining}.")
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}{}", base.trim().trim_end_matches('/'), path)
}

/// `/api/whatsapp/address/<id>` with the id as exactly one path segment.
/// Dot segments are refused because URL parsing would resolve them.
fn address_path(id: &str) -> Result<String, ApiError> {
    if matches!(id, "" | "." | "..") {
        return Err(ApiError::InvalidId(id.to_string()));
    }
    Ok(format!("{ADDRESS_PATH}/{}", urlencoding::encode(id)))
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Best-effort extraction of a server-provided error message.
fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message.or(b.error))
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_ERROR_MESSAGE.to_string())
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(ApiError::Status {
            status: status.as_u16(),
            message: error_message(&body),
        });
    }
    serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
}

/// Client for the backend's address-book endpoints.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            token: None,
        })
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = join_url(&self.base_url, path);
        debug!(
            component = "api",
            event = "api.request",
            method = %method,
            url = %url,
        );
        let builder = self.http.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    pub async fn list_addresses(&self, query: &AddressQuery) -> Result<Page<Address>, ApiError> {
        let response = self
            .request(Method::GET, ADDRESS_PATH)
            .query(query)
            .send()
            .await?;
        decode(response).await
    }

    pub async fn update_address(
        &self,
        id: &str,
        update: &AddressUpdate,
    ) -> Result<Address, ApiError> {
        let response = self
            .request(Method::PUT, &address_path(id)?)
            .json(update)
            .send()
            .await?;
        decode(response).await
    }

    pub async fn delete_address(&self, id: &str) -> Result<(), ApiError> {
        let response = self
            .request(Method::DELETE, &address_path(id)?)
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::Status {
            status: status.as_u16(),
            message: error_message(&body),
        })
    }
}

#[derive(Serialize)]
struct VerifyPasswordRequest<'a> {
    password: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyPasswordResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    retry_after: Option<u64>,
}

/// Password gate served by the dashboard itself.
#[derive(Debug, Clone)]
pub struct AuthClient {
    http: reqwest::Client,
    dashboard_url: String,
}

impl AuthClient {
    pub fn new(dashboard_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            dashboard_url: dashboard_url.into(),
        })
    }

    /// Returns the bearer token on success.
    pub async fn verify_password(&self, password: &str) -> Result<String, ApiError> {
        let url = join_url(&self.dashboard_url, VERIFY_PASSWORD_PATH);
        let response = self
            .http
            .post(&url)
            .json(&VerifyPasswordRequest { password })
            .send()
            .await?;

        let status = response.status();
        let header_retry = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let body = response.text().await?;
        let parsed = serde_json::from_str::<VerifyPasswordResponse>(&body).ok();

        match status {
            StatusCode::TOO_MANY_REQUESTS => {
                let secs = parsed
                    .as_ref()
                    .and_then(|p| p.retry_after)
                    .or(header_retry)
                    .unwrap_or(0);
                warn!(
                    component = "api",
                    event = "api.auth.rate_limited",
                    retry_after_secs = secs,
                    "Password verification rate limited"
                );
                Err(ApiError::rate_limited(Duration::from_secs(secs)))
            }
            StatusCode::UNAUTHORIZED => Err(ApiError::InvalidPassword),
            s if s.is_success() => match parsed {
                Some(VerifyPasswordResponse {
                    success: true,
                    token: Some(token),
                    ..
                }) => Ok(token),
                Some(VerifyPasswordResponse { success: false, .. }) => {
                    Err(ApiError::InvalidPassword)
                }
                _ => Err(ApiError::Decode(format!(
                    "missing token in verify-password response: {}",
                    body.chars().take(200).collect::<String>()
                ))),
            },
            s => Err(ApiError::Status {
                status: s.as_u16(),
                message: error_message(&body),
            }),
        }
    }
}
