//! # Publish/Subscribe Transport
//!
//! Defines the transport contract the gateway publishes events through, and
//! an in-memory implementation for single-node deployments and tests.

use crate::publication::{BusError, Publication};
use crate::subscriber::Subscription;
use crate::DEFAULT_CHANNEL_CAPACITY;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// A publish/subscribe transport.
///
/// Publishing sends one publication to every current subscriber of its
/// topic. Fan-out and per-subscriber filtering happen on the receiving side.
#[async_trait]
pub trait PubSubServer: Send + Sync {
    /// Publish a publication to its topic.
    async fn publish(&self, publication: Publication) -> Result<(), BusError>;

    /// Subscribe to `topic`. The returned handle detaches on drop.
    fn subscribe(&self, topic: &str) -> Subscription;
}

type SubscriberMap = HashMap<String, Vec<(u64, mpsc::Sender<Publication>)>>;

/// In-memory transport backed by one bounded channel per subscriber.
///
/// A subscriber that does not keep up loses publications rather than
/// slowing the publisher down.
pub struct InMemoryPubSub {
    subscribers: Arc<Mutex<SubscriberMap>>,
    next_id: AtomicU64,
    published: AtomicU64,
    capacity: usize,
}

impl InMemoryPubSub {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a transport whose subscribers buffer `capacity` publications.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            published: AtomicU64::new(0),
            capacity: capacity.max(1),
        }
    }

    /// Current number of subscribers on `topic`.
    #[must_use]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.subscribers.lock().get(topic).map_or(0, Vec::len)
    }

    /// Total publications accepted.
    #[must_use]
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

impl Default for InMemoryPubSub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PubSubServer for InMemoryPubSub {
    async fn publish(&self, publication: Publication) -> Result<(), BusError> {
        self.published.fetch_add(1, Ordering::Relaxed);

        let senders: Vec<_> = self
            .subscribers
            .lock()
            .get(publication.topic())
            .map(|subs| subs.iter().map(|(id, tx)| (*id, tx.clone())).collect())
            .unwrap_or_default();

        for (id, sender) in &senders {
            match sender.try_send(publication.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(
                        topic = %publication.topic(),
                        subscriber = id,
                        "Subscriber lagging, publication dropped"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(subscriber = id, "Subscriber gone");
                }
            }
        }

        debug!(
            topic = %publication.topic(),
            receivers = senders.len(),
            "Publication sent"
        );

        Ok(())
    }

    fn subscribe(&self, topic: &str) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.capacity);

        self.subscribers
            .lock()
            .entry(topic.to_string())
            .or_default()
            .push((id, tx));

        debug!(topic = %topic, subscriber = id, "New subscription created");

        let subscribers = Arc::clone(&self.subscribers);
        let key = topic.to_string();
        Subscription::new(topic, rx, move || {
            let mut map = subscribers.lock();
            if let Some(subs) = map.get_mut(&key) {
                subs.retain(|(sub_id, _)| *sub_id != id);
                if subs.is_empty() {
                    map.remove(&key);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn publication(topic: &str, value: u32) -> Publication {
        let mut p = Publication::new(topic);
        p.encode(&value).unwrap();
        p
    }

    #[tokio::test]
    async fn test_publish_no_subscribers() {
        let bus = InMemoryPubSub::new();
        bus.publish(publication("events", 1)).await.unwrap();
        assert_eq!(bus.published(), 1);
    }

    #[tokio::test]
    async fn test_every_subscriber_receives() {
        let bus = InMemoryPubSub::new();
        let mut a = bus.subscribe("events");
        let mut b = bus.subscribe("events");

        bus.publish(publication("events", 7)).await.unwrap();

        for sub in [&mut a, &mut b] {
            let received = timeout(Duration::from_millis(100), sub.recv())
                .await
                .expect("timeout")
                .expect("closed");
            assert_eq!(received.decode::<u32>().unwrap(), 7);
        }
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let bus = InMemoryPubSub::new();
        let mut other = bus.subscribe("other");

        bus.publish(publication("events", 1)).await.unwrap();

        assert!(other.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_unsubscribe_detaches() {
        let bus = InMemoryPubSub::new();
        let sub = bus.subscribe("events");
        assert_eq!(bus.subscriber_count("events"), 1);

        sub.unsubscribe();
        assert_eq!(bus.subscriber_count("events"), 0);
    }

    #[tokio::test]
    async fn test_slow_subscriber_does_not_block() {
        let bus = InMemoryPubSub::with_capacity(1);
        let mut sub = bus.subscribe("events");

        bus.publish(publication("events", 1)).await.unwrap();
        bus.publish(publication("events", 2)).await.unwrap();

        assert_eq!(sub.try_recv().unwrap().decode::<u32>().unwrap(), 1);
        assert!(sub.try_recv().is_none());
    }
}
