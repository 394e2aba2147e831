use tokio::sync::watch;
use tracing::debug;

/// Topic under which pairing payloads are published.
pub const PAIRING_TOPIC: &str = "connection.qr";

/// Internal pub/sub for events consumed outside the session loop.
///
/// Subscribers always observe the most recent value; a slow reader never
/// blocks the publisher.
#[derive(Debug, Clone)]
pub struct EventBus {
    pairing: watch::Sender<Option<String>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        let (pairing, _) = watch::channel(None);
        Self { pairing }
    }

    pub fn publish_pairing(&self, payload: impl Into<String>) {
        let payload = payload.into();
        debug!(topic = PAIRING_TOPIC, len = payload.len(), "Publishing pairing payload");
        self.pairing.send_replace(Some(payload));
    }

    #[must_use]
    pub fn latest_pairing(&self) -> Option<String> {
        self.pairing.borrow().clone()
    }

    #[must_use]
    pub fn subscribe_pairing(&self) -> watch::Receiver<Option<String>> {
        self.pairing.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nothing_published_initially() {
        let bus = EventBus::new();
        assert!(bus.latest_pairing().is_none());
    }

    #[tokio::test]
    async fn subscribers_see_latest_payload() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe_pairing();
        bus.publish_pairing("first");
        bus.publish_pairing("second");
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().as_deref(), Some("second"));
        assert_eq!(bus.latest_pairing().as_deref(), Some("second"));
    }
}
