use std::collections::HashMap;

use common::dtos::status_events::{DocumentStatusUpdatedDto, WorkspaceStatusUpdatedDto};
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

/// Real-time notification sent to the clients of one user
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum StatusNotification {
    DocumentStatus(DocumentStatusUpdatedDto),
    WorkspaceStatus(WorkspaceStatusUpdatedDto),
}

impl StatusNotification {
    /// Name of the notification on the client transport
    pub fn event_name(&self) -> &'static str {
        match self {
            StatusNotification::DocumentStatus(_) => "document_status",
            StatusNotification::WorkspaceStatus(_) => "workspace_status",
        }
    }

    pub fn user_id(&self) -> Uuid {
        match self {
            StatusNotification::DocumentStatus(event) => event.user_id,
            StatusNotification::WorkspaceStatus(event) => event.user_id,
        }
    }
}

/// Fans out status notifications to per-user channels
///
/// A channel is created by the first subscription of a user. Notifications for a user
/// without subscribers are dropped, and a channel whose receivers are all gone is removed.
pub struct StatusBroadcaster {
    channels: RwLock<HashMap<String, broadcast::Sender<StatusNotification>>>,
    capacity: usize,
}

impl StatusBroadcaster {
    /// `capacity`: notifications kept for a lagging subscriber before it misses some
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn channel_name(user_id: Uuid) -> String {
        format!("user_{}", user_id)
    }

    pub async fn subscribe(&self, user_id: Uuid) -> broadcast::Receiver<StatusNotification> {
        let channel_name = Self::channel_name(user_id);
        let mut channels = self.channels.write().await;

        match channels.get(&channel_name) {
            Some(sender) => sender.subscribe(),
            None => {
                // Users who left without being notified again
                channels.retain(|_, sender| sender.receiver_count() > 0);

                let (sender, receiver) = broadcast::channel(self.capacity);
                info!(channel = %channel_name, "Created status channel");
                channels.insert(channel_name, sender);
                receiver
            }
        }
    }

    /// Sends the notification to the channel of its user, returns the number of receivers
    #[tracing::instrument(name = "Broadcasting status", skip(self, notification), fields(event = notification.event_name()))]
    pub async fn broadcast(&self, notification: StatusNotification) -> usize {
        let channel_name = Self::channel_name(notification.user_id());
        let sent = {
            let channels = self.channels.read().await;
            match channels.get(&channel_name) {
                Some(sender) => sender.send(notification),
                None => {
                    debug!(channel = %channel_name, "No subscriber, notification dropped");
                    return 0;
                }
            }
        };

        match sent {
            Ok(receivers) => receivers,
            // Every receiver is gone
            Err(_) => {
                let mut channels = self.channels.write().await;
                // Unless someone subscribed again in the meantime
                if channels
                    .get(&channel_name)
                    .map_or(false, |sender| sender.receiver_count() == 0)
                {
                    channels.remove(&channel_name);
                    debug!(channel = %channel_name, "Removed status channel without subscriber");
                }
                0
            }
        }
    }

    /// Removes the channels without receivers, returns how many were removed
    pub async fn prune_idle(&self) -> usize {
        let mut channels = self.channels.write().await;
        let before = channels.len();
        channels.retain(|_, sender| sender.receiver_count() > 0);

        before - channels.len()
    }

    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }
}
