use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use super::NotificationEvent;

pub type NotificationSender = mpsc::UnboundedSender<NotificationEvent>;

/// Per-camera cooldown gate in front of the notification queue.
///
/// The decision happens on the capture thread; delivery happens on the
/// dispatcher task, so a slow channel never stalls capture.
pub struct NotificationThrottler {
    camera_id: String,
    cooldown: Duration,
    last_alert: Mutex<Option<Instant>>,
    sender: NotificationSender,
}

impl NotificationThrottler {
    pub fn new(camera_id: String, cooldown: Duration, sender: NotificationSender) -> Self {
        Self {
            camera_id,
            cooldown,
            last_alert: Mutex::new(None),
            sender,
        }
    }

    pub fn notify(&self, class_name: &str) -> bool {
        self.notify_at(Instant::now(), class_name)
    }

    pub fn notify_at(&self, now: Instant, class_name: &str) -> bool {
        {
            let mut last_alert = self.last_alert.lock().unwrap_or_else(PoisonError::into_inner);
            let due = match *last_alert {
                None => true,
                Some(previous) => now.saturating_duration_since(previous) > self.cooldown,
            };
            if !due {
                tracing::trace!(camera = %self.camera_id, class = %class_name, "alert suppressed by cooldown");
                return false;
            }
            *last_alert = Some(now);
        }

        let event = NotificationEvent::new(&self.camera_id, class_name);
        tracing::info!(camera = %self.camera_id, class = %class_name, "raising alert");
        if self.sender.send(event).is_err() {
            tracing::warn!(camera = %self.camera_id, "notification dispatcher is gone, alert dropped");
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn throttler(cooldown_secs: u64) -> (NotificationThrottler, mpsc::UnboundedReceiver<NotificationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            NotificationThrottler::new("cam".into(), Duration::from_secs(cooldown_secs), tx),
            rx,
        )
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<NotificationEvent>) -> Vec<NotificationEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn first_detection_always_alerts() {
        let (throttler, mut rx) = throttler(30);
        assert!(throttler.notify("person"));
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[test]
    fn cooldown_sequence_dispatches_twice() {
        let (throttler, mut rx) = throttler(30);
        let t0 = Instant::now();

        let fired: Vec<bool> = [0, 10, 20, 31]
            .iter()
            .map(|&s| throttler.notify_at(t0 + Duration::from_secs(s), "person"))
            .collect();

        assert_eq!(fired, vec![true, false, false, true]);
        // the cooldown restarts from the second alert
        assert!(!throttler.notify_at(t0 + Duration::from_secs(60), "person"));
        assert!(throttler.notify_at(t0 + Duration::from_secs(62), "person"));

        let events = drain(&mut rx);
        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|e| e.camera_id == "cam" && e.message == "Person detected"));
    }

    #[test]
    fn exactly_at_cooldown_is_still_suppressed() {
        let (throttler, mut rx) = throttler(30);
        let t0 = Instant::now();

        assert!(throttler.notify_at(t0, "person"));
        assert!(!throttler.notify_at(t0 + Duration::from_secs(30), "person"));
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[test]
    fn closed_queue_still_starts_cooldown() {
        let (throttler, rx) = throttler(30);
        drop(rx);
        let t0 = Instant::now();

        assert!(throttler.notify_at(t0, "person"));
        assert!(!throttler.notify_at(t0 + Duration::from_secs(5), "person"));
    }

    #[test]
    fn cameras_are_independent() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let front = NotificationThrottler::new("front".into(), Duration::from_secs(30), tx.clone());
        let back = NotificationThrottler::new("back".into(), Duration::from_secs(30), tx);
        let t0 = Instant::now();

        assert!(front.notify_at(t0, "person"));
        assert!(back.notify_at(t0 + Duration::from_secs(1), "person"));

        let cameras: Vec<String> = drain(&mut rx).into_iter().map(|e| e.camera_id).collect();
        assert_eq!(cameras, vec!["front", "back"]);
    }
}
