use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;

use super::{NotificationChannel, NotificationEvent, NotificationSender};

pub fn queue() -> (NotificationSender, mpsc::UnboundedReceiver<NotificationEvent>) {
    mpsc::unbounded_channel()
}

/// Fans queued alerts out to one delivery task per channel, so a stalled
/// channel only backs up its own lane.
pub struct NotificationDispatcher {
    receiver: mpsc::UnboundedReceiver<NotificationEvent>,
    channels: Vec<NotificationChannel>,
}

impl NotificationDispatcher {
    pub fn new(
        receiver: mpsc::UnboundedReceiver<NotificationEvent>,
        channels: Vec<NotificationChannel>,
    ) -> Self {
        Self { receiver, channels }
    }

    pub async fn run(self) {
        let Self {
            mut receiver,
            channels,
        } = self;

        let names: Vec<&str> = channels.iter().map(|c| c.name()).collect();
        tracing::info!(channels = ?names, "notification dispatcher started");

        let mut lanes = Vec::with_capacity(channels.len());
        let mut workers = JoinSet::new();
        for channel in channels {
            let (tx, rx) = mpsc::unbounded_channel();
            lanes.push((channel.name(), tx));
            workers.spawn(deliver_lane(channel, rx));
        }

        while let Some(event) = receiver.recv().await {
            let event = Arc::new(event);
            for (name, lane) in &lanes {
                if lane.send(Arc::clone(&event)).is_err() {
                    tracing::warn!(channel = *name, "delivery task is gone, alert dropped");
                }
            }
        }

        drop(lanes);
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "delivery task failed");
            }
        }

        tracing::debug!("notification dispatcher shutting down");
    }
}

async fn deliver_lane(
    channel: NotificationChannel,
    mut events: mpsc::UnboundedReceiver<Arc<NotificationEvent>>,
) {
    let mut delivered = 0u64;
    while let Some(event) = events.recv().await {
        match channel.deliver(&event).await {
            Ok(()) => delivered += 1,
            Err(e) => {
                tracing::error!(
                    camera = %event.camera_id,
                    channel = channel.name(),
                    error = %e,
                    "failed to deliver notification"
                );
            }
        }
    }
    tracing::debug!(channel = channel.name(), delivered, "delivery lane closed");
}
