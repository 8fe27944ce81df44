use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

const NOTIFICATION_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A user-facing message about orchestration progress or failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub message: String,
}

/// Fan-out of notifications. Sending with no listeners is fine.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    pub fn notify(&self, level: NotificationLevel, title: impl Into<String>, message: impl Into<String>) {
        let notification = Notification {
            level,
            title: title.into(),
            message: message.into(),
        };
        match level {
            NotificationLevel::Warning => warn!(title = %notification.title, message = %notification.message, "Notification"),
            NotificationLevel::Error => error!(title = %notification.title, message = %notification.message, "Notification"),
            _ => info!(title = %notification.title, "Notification"),
        }
        let _ = self.tx.send(notification);
    }

    pub fn info(&self, title: impl Into<String>, message: impl Into<String>) {
        self.notify(NotificationLevel::Info, title, message);
    }

    pub fn success(&self, title: impl Into<String>, message: impl Into<String>) {
        self.notify(NotificationLevel::Success, title, message);
    }

    pub fn warning(&self, title: impl Into<String>, message: impl Into<String>) {
        self.notify(NotificationLevel::Warning, title, message);
    }

    pub fn error(&self, title: impl Into<String>, message: impl Into<String>) {
        self.notify(NotificationLevel::Error, title, message);
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_notifications_in_order() {
        let notifier = Notifier::new();
        let mut rx = notifier.subscribe();

        notifier.info("Task created", "t1");
        notifier.warning("Processing failed", "502");

        assert_eq!(rx.recv().await.unwrap().level, NotificationLevel::Info);
        let second = rx.recv().await.unwrap();
        assert_eq!(second.level, NotificationLevel::Warning);
        assert_eq!(second.message, "502");
    }

    #[test]
    fn notify_without_subscribers_does_not_fail() {
        Notifier::new().error("Nobody listening", "");
    }
}
