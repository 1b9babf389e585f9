//! User-facing notifications (connection errors, REST failures, ...).

use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// How long a notification stays on screen.
pub const NOTIFICATION_DURATION: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub severity: Severity,
    pub title: String,
    pub detail: Option<String>,
    pub duration: Duration,
}

impl Notification {
    pub fn new(severity: Severity, title: impl Into<String>, detail: Option<String>) -> Self {
        Self {
            severity,
            title: title.into(),
            detail,
            duration: NOTIFICATION_DURATION,
        }
    }

    pub fn error(title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(Severity::Error, title, Some(detail.into()))
    }

    pub fn success(title: impl Into<String>) -> Self {
        Self::new(Severity::Success, title, None)
    }
}

/// Fan-out of notifications to whoever renders them. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(64)
    }
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    /// Log and publish. Having no subscriber is fine.
    pub fn notify(&self, notification: Notification) {
        let detail = notification.detail.as_deref().unwrap_or("");
        match notification.severity {
            Severity::Error => error!(
                component = "notify",
                event = "notify.error",
                title = %notification.title,
                detail = %detail,
            ),
            Severity::Warning => warn!(
                component = "notify",
                event = "notify.warning",
                title = %notification.title,
                detail = %detail,
            ),
            Severity::Info | Severity::Success => info!(
                component = "notify",
                event = "notify.info",
                title = %notification.title,
            ),
        }
        let _ = self.tx.send(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_notifications_use_fixed_duration() {
        let n = Notification::error("Connection error", "refused");
        assert_eq!(n.duration, NOTIFICATION_DURATION);
        assert_eq!(n.detail.as_deref(), Some("refused"));
    }

    #[tokio::test]
    async fn subscribers_receive_notifications() {
        let notifier = Notifier::default();
        let mut rx = notifier.subscribe();
        notifier.notify(Notification::success("Saved"));
        let got = rx.recv().await.expect("notification");
        assert_eq!(got.title, "Saved");
        assert_eq!(got.severity, Severity::Success);
    }

    #[test]
    fn notify_without_subscribers_does_not_panic() {
        Notifier::new(1).notify(Notification::error("x", "y"));
    }
}
