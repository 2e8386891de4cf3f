//! Typed publish/subscribe for unread-count propagation.
//!
//! The bus carries two logical channels, `read-changed` (a relative delta)
//! and `unread-count` (an absolute value). Both travel over one broadcast
//! queue so every subscriber sees events in publication order, whichever
//! channels it listens to. Nothing is persisted: a subscriber only sees
//! events published after it subscribed. Dropping a [`Subscription`] releases
//! it.

use tokio::sync::broadcast;

use crate::config::StoreConfig;

pub const DEFAULT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    ReadChanged,
    UnreadCount,
}

impl Channel {
    pub fn name(self) -> &'static str {
        match self {
            Channel::ReadChanged => "read-changed",
            Channel::UnreadCount => "unread-count",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusEvent {
    ReadChanged { delta: i64 },
    UnreadCount { count: u32 },
}

impl BusEvent {
    pub fn channel(&self) -> Channel {
        match self {
            BusEvent::ReadChanged { .. } => Channel::ReadChanged,
            BusEvent::UnreadCount { .. } => Channel::UnreadCount,
        }
    }
}

/// Cheap to clone; every clone publishes into the same queue.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BusEvent>,
    capacity: usize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// A bus sized by `config.bus_capacity`.
    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(config.bus_capacity)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Publish on `read-changed`. Returns the number of live subscriptions.
    pub fn publish_read_changed(&self, delta: i64) -> usize {
        self.publish(BusEvent::ReadChanged { delta })
    }

    /// Publish on `unread-count`. Returns the number of live subscriptions.
    pub fn publish_unread_count(&self, count: u32) -> usize {
        self.publish(BusEvent::UnreadCount { count })
    }

    fn publish(&self, event: BusEvent) -> usize {
        match self.tx.send(event) {
            Ok(n) => {
                log::debug!("bus {} {:?} -> {n} subscribers", event.channel().name(), event);
                n
            }
            Err(_) => 0,
        }
    }

    /// Subscribe to the given channels.
    pub fn subscribe(&self, channels: &[Channel]) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            channels: channels.to_vec(),
            missed: 0,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

pub struct Subscription {
    rx: broadcast::Receiver<BusEvent>,
    channels: Vec<Channel>,
    missed: u64,
}

impl Subscription {
    /// Next event on one of the subscribed channels, or `None` once every
    /// publisher is gone.
    ///
    /// A subscriber that falls behind by more than the bus capacity skips the
    /// overwritten events. Nothing replays them; the count of skipped events
    /// is reported by [`take_missed`](Self::take_missed) so the subscriber can
    /// resynchronise from the store.
    pub async fn recv(&mut self) -> Option<BusEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.channels.contains(&event.channel()) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    log::warn!("bus subscriber lagged, {n} events skipped");
                    self.missed += n;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Events skipped since the last call, on any channel.
    pub fn take_missed(&mut self) -> u64 {
        std::mem::take(&mut self.missed)
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<BusEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if self.channels.contains(&event.channel()) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    log::warn!("bus subscriber lagged, {n} events skipped");
                    self.missed += n;
                }
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_sees_both_channels_in_publication_order() {
        let bus = EventBus::default();
        let mut sub = bus.subscribe(&[Channel::ReadChanged, Channel::UnreadCount]);

        bus.publish_unread_count(3);
        bus.publish_read_changed(-1);
        bus.publish_unread_count(2);

        assert_eq!(sub.recv().await, Some(BusEvent::UnreadCount { count: 3 }));
        assert_eq!(sub.recv().await, Some(BusEvent::ReadChanged { delta: -1 }));
        assert_eq!(sub.recv().await, Some(BusEvent::UnreadCount { count: 2 }));
    }

    #[test]
    fn subscription_filters_channels() {
        let bus = EventBus::default();
        let mut sub = bus.subscribe(&[Channel::ReadChanged]);
        bus.publish_unread_count(5);
        bus.publish_read_changed(-1);
        assert_eq!(sub.try_recv(), Some(BusEvent::ReadChanged { delta: -1 }));
        assert_eq!(sub.try_recv(), None);
    }

    #[test]
    fn past_events_are_not_replayed() {
        let bus = EventBus::default();
        assert_eq!(bus.publish_unread_count(1), 0);
        let mut sub = bus.subscribe(&[Channel::UnreadCount]);
        assert_eq!(sub.try_recv(), None);
    }

    #[test]
    fn dropping_subscription_releases_it() {
        let bus = EventBus::default();
        let sub = bus.subscribe(&[Channel::UnreadCount]);
        assert_eq!(bus.subscriber_count(), 1);
        drop(sub);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn lagging_subscriber_keeps_newest_events() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe(&[Channel::UnreadCount]);
        for count in 0..5 {
            bus.publish_unread_count(count);
        }
        assert_eq!(sub.try_recv(), Some(BusEvent::UnreadCount { count: 3 }));
        assert_eq!(sub.try_recv(), Some(BusEvent::UnreadCount { count: 4 }));
        assert_eq!(sub.take_missed(), 3);
        assert_eq!(sub.take_missed(), 0);
    }

    #[test]
    fn capacity_comes_from_config() {
        let mut config = StoreConfig::new("https://db.example.com");
        config.bus_capacity = 8;
        assert_eq!(EventBus::from_config(&config).capacity(), 8);
        assert_eq!(EventBus::default().capacity(), DEFAULT_CAPACITY);
    }
}
