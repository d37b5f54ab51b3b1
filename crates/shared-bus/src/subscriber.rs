//! # Subscriptions
//!
//! The receiving side of the transport. A [`Subscription`] yields the
//! publications of one topic and detaches itself when dropped.

use crate::publication::Publication;
use tokio::sync::mpsc;
use tracing::debug;

type Unsubscribe = Box<dyn FnOnce() + Send + Sync>;

/// A live subscription to a topic.
///
/// Dropping the handle, or calling [`Subscription::unsubscribe`], detaches
/// it from the transport; no further publication is delivered afterwards.
pub struct Subscription {
    topic: String,
    receiver: mpsc::Receiver<Publication>,
    unsubscribe: Option<Unsubscribe>,
}

impl Subscription {
    /// Build a subscription from a receiving channel and the function that
    /// detaches it. Transports call this; consumers get it from
    /// [`crate::PubSubServer::subscribe`].
    pub fn new(
        topic: impl Into<String>,
        receiver: mpsc::Receiver<Publication>,
        unsubscribe: impl FnOnce() + Send + Sync + 'static,
    ) -> Self {
        Self {
            topic: topic.into(),
            receiver,
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Receive the next publication.
    ///
    /// Returns `None` once the transport has dropped the sending side.
    pub async fn recv(&mut self) -> Option<Publication> {
        self.receiver.recv().await
    }

    /// Receive without waiting.
    pub fn try_recv(&mut self) -> Option<Publication> {
        self.receiver.try_recv().ok()
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Detach explicitly.
    pub fn unsubscribe(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
            debug!(topic = %self.topic, "Subscription detached");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("attached", &self.unsubscribe.is_some())
            .finish()
    }
}
