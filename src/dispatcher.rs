use tokio::sync::broadcast;

use crate::event::HubbyEvent;

const DEFAULT_CAPACITY: usize = 64;

pub trait Dispatcher {
    fn dispatch(&self, event: HubbyEvent);
}

/// Publish/subscribe bus for upward events
///
/// Publishing never blocks; a subscriber that falls behind by more than the
/// capacity observes `RecvError::Lagged`.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<HubbyEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HubbyEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Dispatcher for EventBus {
    fn dispatch(&self, event: HubbyEvent) {
        self.sender.dispatch(event);
    }
}

impl Dispatcher for broadcast::Sender<HubbyEvent> {
    fn dispatch(&self, event: HubbyEvent) {
        // no subscribers is not an error
        let _ = self.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_subscriber_sees_each_event() {
        let bus = EventBus::default();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.dispatch(HubbyEvent::AuthorizationRevoked);

        assert_eq!(a.recv().await.unwrap(), HubbyEvent::AuthorizationRevoked);
        assert_eq!(b.recv().await.unwrap(), HubbyEvent::AuthorizationRevoked);
    }

    #[test]
    fn dispatch_without_subscribers_is_silent() {
        EventBus::new(1).dispatch(HubbyEvent::Reauthorized);
    }
}
