//! Notification dispatch for release events.

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::domain::ReleaseState;
use crate::policy::NotificationEvent;

/// Message delivered to every channel subscribed to `event`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub event: NotificationEvent,
    pub tag: String,
    pub state: ReleaseState,
    pub message: String,
}

/// Delivers notifications to a channel (`slack:#releases`, `email:qa@...`).
/// Failures are logged by the caller and never fail the release operation.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, channel: &str, notification: &Notification) -> anyhow::Result<()>;
}

/// Notifier that only logs. Used when no delivery backend is wired in.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, channel: &str, notification: &Notification) -> anyhow::Result<()> {
        info!(
            event = "notify.sent",
            channel = %channel,
            notification = %notification.event,
            tag = %notification.tag,
            message = %notification.message,
        );
        Ok(())
    }
}
