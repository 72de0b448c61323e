use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use ulid::Ulid;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    AppointmentBooked,
    AppointmentStatusChanged,
    AppointmentRescheduled,
    AppointmentCancelled,
    AppointmentReminder,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub user_id: Ulid,
    pub kind: NotificationKind,
    pub payload: serde_json::Value,
}

#[derive(Debug)]
pub struct NotifyError(pub String);

impl std::fmt::Display for NotifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "notification failed: {}", self.0)
    }
}

impl std::error::Error for NotifyError {}

/// Delivery of user-facing notifications (email, SMS, in-app) lives behind this.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        user_id: Ulid,
        kind: NotificationKind,
        payload: serde_json::Value,
    ) -> Result<(), NotifyError>;
}

/// In-process broadcast hub, one channel per user.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Notification>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to notifications for a user. Creates the channel if needed.
    pub fn subscribe(&self, user_id: Ulid) -> broadcast::Receiver<Notification> {
        let sender = self
            .channels
            .entry(user_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, notification: Notification) {
        if let Some(sender) = self.channels.get(&notification.user_id) {
            let _ = sender.send(notification);
        }
    }
}

#[async_trait]
impl Notifier for NotifyHub {
    async fn notify(
        &self,
        user_id: Ulid,
        kind: NotificationKind,
        payload: serde_json::Value,
    ) -> Result<(), NotifyError> {
        self.send(Notification {
            user_id,
            kind,
            payload,
        });
        Ok(())
    }
}

/// Fire-and-forget: the caller never waits on delivery and never sees its failure.
pub fn dispatch(
    notifier: Arc<dyn Notifier>,
    user_id: Ulid,
    kind: NotificationKind,
    payload: serde_json::Value,
) {
    tokio::spawn(async move {
        if let Err(e) = notifier.notify(user_id, kind, payload).await {
            metrics::counter!(crate::observability::NOTIFICATIONS_FAILED_TOTAL).increment(1);
            tracing::warn!(%user_id, ?kind, "{e}");
        }
    });
}
