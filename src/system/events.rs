//! Change notifications published by the controller
//! Subscribers may lag behind; they skip what the bus has already dropped.

use embassy_sync::{
    blocking_mutex::raw::CriticalSectionRawMutex,
    pubsub::{PubSubChannel, Subscriber, WaitResult},
};
use log::warn;

use crate::types::{MachineState, Resource};

const BUS_CAPACITY: usize = 64;
const BUS_SUBSCRIBERS: usize = 4;
const BUS_PUBLISHERS: usize = 1;

type Channel =
    PubSubChannel<CriticalSectionRawMutex, Notification, BUS_CAPACITY, BUS_SUBSCRIBERS, BUS_PUBLISHERS>;

/// One published attribute changed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    StateChanged(MachineState),
    LevelChanged { resource: Resource, level: u32 },
    CupsProcessedChanged(u32),
    CupPresenceChanged(bool),
}

/// Publish/subscribe bus for [`Notification`]s. Share it through an `Arc`.
pub struct NotificationBus {
    channel: Channel,
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationBus {
    pub fn new() -> Self {
        Self {
            channel: PubSubChannel::new(),
        }
    }

    /// Never blocks; a full queue drops the oldest message and the lagging
    /// subscriber skips it.
    pub fn publish(&self, notification: Notification) {
        self.channel.immediate_publisher().publish_immediate(notification);
    }

    pub fn subscriber(&self) -> anyhow::Result<NotificationSubscriber<'_>> {
        let inner = self
            .channel
            .subscriber()
            .map_err(|e| anyhow::anyhow!("notification bus: {:?}", e))?;
        Ok(NotificationSubscriber { inner })
    }
}

pub struct NotificationSubscriber<'a> {
    inner: Subscriber<'a, CriticalSectionRawMutex, Notification, BUS_CAPACITY, BUS_SUBSCRIBERS, BUS_PUBLISHERS>,
}

impl<'a> NotificationSubscriber<'a> {
    /// Wait for the next notification
    pub async fn next(&mut self) -> Notification {
        loop {
            match self.inner.next_message().await {
                WaitResult::Lagged(count) => {
                    warn!("Notification subscriber lagged, {} messages lost", count);
                    continue;
                }
                WaitResult::Message(notification) => return notification,
            }
        }
    }

    /// Next queued notification without waiting
    pub fn try_next(&mut self) -> Option<Notification> {
        loop {
            match self.inner.try_next_message()? {
                WaitResult::Lagged(count) => {
                    warn!("Notification subscriber lagged, {} messages lost", count);
                    continue;
                }
                WaitResult::Message(notification) => return Some(notification),
            }
        }
    }

    /// Everything queued right now, oldest first.
    pub fn drain(&mut self) -> Vec<Notification> {
        std::iter::from_fn(|| self.try_next()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscriber_sees_published_notifications_in_order() {
        let bus = NotificationBus::new();
        let mut sub = bus.subscriber().unwrap();
        bus.publish(Notification::CupPresenceChanged(true));
        bus.publish(Notification::StateChanged(MachineState::SelfCheck));
        assert_eq!(
            sub.drain(),
            vec![
                Notification::CupPresenceChanged(true),
                Notification::StateChanged(MachineState::SelfCheck),
            ]
        );
        assert_eq!(sub.try_next(), None);
    }

    #[test]
    fn test_subscriber_limit() {
        let bus = NotificationBus::new();
        let _subs: Vec<_> = (0..BUS_SUBSCRIBERS)
            .map(|_| bus.subscriber().unwrap())
            .collect();
        assert!(bus.subscriber().is_err());
    }
}
