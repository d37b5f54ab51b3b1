//! # Push Flow
//!
//! A successful write travels dispatcher → session manager → in-memory
//! pubsub → subscribed push session, with the sessions handler filtering
//! at both the publishing and the delivering end.

use super::fixtures::*;
use api_gateway::{GatewayBuilder, GatewayService, Session, SessionKind, SessionsHandler};
use async_trait::async_trait;
use serde_json::{json, Value};
use shared_bus::{InMemoryPubSub, PubSubServer, Subscription};
use shared_types::{Event, EventType, Operation};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// Publishes everything but deletes; delivers to sessions asking for the
/// event's identity through the `identity` query parameter.
#[derive(Default)]
struct IdentityFilter {
    started: AtomicUsize,
    stopped: AtomicUsize,
}

#[async_trait]
impl SessionsHandler for IdentityFilter {
    fn on_push_session_start(&self, _session: &Session) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    fn on_push_session_stop(&self, _session: &Session) {
        self.stopped.fetch_add(1, Ordering::SeqCst);
    }

    async fn should_publish(&self, event: &Event) -> anyhow::Result<bool> {
        Ok(event.event_type != EventType::Delete)
    }

    async fn should_push(&self, session: &Session, event: &Event) -> anyhow::Result<bool> {
        Ok(session.parameter("identity") == Some(event.identity.as_str()))
    }
}

fn gateway(handler: Arc<IdentityFilter>, bus: Arc<InMemoryPubSub>) -> GatewayService {
    GatewayBuilder::new(config(), relationships())
        .with_processors(Arc::new(registry(
            Arc::new(MemoryStore::new(list())),
            Arc::new(MemoryStore::new(task())),
        )))
        .with_sessions_handler(handler)
        .with_pubsub(bus as Arc<dyn PubSubServer>)
        .build()
        .unwrap()
}

fn push_session(identity: &str) -> Arc<Session> {
    Arc::new(
        Session::new(SessionKind::Push)
            .with_parameters(vec![("identity".to_string(), identity.to_string())]),
    )
}

async fn next(subscription: &mut Subscription) -> shared_bus::Publication {
    timeout(Duration::from_secs(1), subscription.recv())
        .await
        .expect("publication not received")
        .expect("transport closed")
}

// =============================================================================
// DELIVERY
// =============================================================================

#[tokio::test]
async fn test_created_object_reaches_subscribed_session() {
    let handler = Arc::new(IdentityFilter::default());
    let bus = Arc::new(InMemoryPubSub::new());
    let service = gateway(Arc::clone(&handler), Arc::clone(&bus));
    let sessions = service.sessions();

    let watcher = push_session("list");
    sessions.register_session(Arc::clone(&watcher)).unwrap();
    let mut subscription = sessions.subscribe().unwrap();
    assert_eq!(handler.started.load(Ordering::SeqCst), 1);

    let ctx = service
        .dispatcher()
        .dispatch(Operation::Create, raw_with_body("lists", json!({"name": "inbox"})))
        .await
        .unwrap();
    assert!(!ctx.has_errors());

    let publication = next(&mut subscription).await;
    let text = sessions
        .deliverable(&watcher, &publication)
        .await
        .expect("event should be delivered");

    let event: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(event["type"], "create");
    assert_eq!(event["identity"], "list");
    assert_eq!(event["entity"]["name"], "inbox");

    // A session watching tasks filters the same publication out.
    let other = push_session("task");
    sessions.register_session(Arc::clone(&other)).unwrap();
    assert!(sessions.deliverable(&other, &publication).await.is_none());

    // Once unregistered, nothing is delivered.
    sessions.unregister_session(&watcher);
    assert!(sessions.deliverable(&watcher, &publication).await.is_none());
    assert_eq!(handler.stopped.load(Ordering::SeqCst), 1);
    assert_eq!(sessions.session_count(), 1);
}

#[tokio::test]
async fn test_filtered_and_failed_writes_are_not_published() {
    let handler = Arc::new(IdentityFilter::default());
    let bus = Arc::new(InMemoryPubSub::new());
    let service = gateway(handler, Arc::clone(&bus));
    let dispatcher = service.dispatcher();
    let mut subscription = service.sessions().subscribe().unwrap();

    let created = dispatcher
        .dispatch(Operation::Create, raw_with_body("lists", json!({"name": "tmp"})))
        .await
        .unwrap();
    assert!(!created.has_errors());
    next(&mut subscription).await;

    // Delete events are refused by `should_publish`.
    let deleted = dispatcher
        .dispatch(Operation::Delete, raw("lists", Some("list-1")))
        .await
        .unwrap();
    assert!(!deleted.has_errors());

    // A failing write produces no event at all.
    let failed = dispatcher
        .dispatch(Operation::Delete, raw("lists", Some("list-1")))
        .await
        .unwrap();
    assert!(failed.has_errors());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(subscription.try_recv().is_none());
    assert_eq!(bus.published(), 1);
}

#[tokio::test]
async fn test_update_event_carries_new_entity() {
    let handler = Arc::new(IdentityFilter::default());
    let bus = Arc::new(InMemoryPubSub::new());
    let service = gateway(handler, Arc::clone(&bus));
    let sessions = service.sessions();
    let mut subscription = sessions.subscribe().unwrap();

    let parent = service
        .dispatcher()
        .dispatch(Operation::Create, raw_with_body("lists", json!({"name": "p"})))
        .await
        .unwrap();
    assert!(!parent.has_errors());
    next(&mut subscription).await;

    let ctx = service
        .dispatcher()
        .dispatch(Operation::Update, {
            let mut request = raw_with_body("lists", json!({"name": "renamed"}));
            request.route.id = Some("list-1".to_string());
            request
        })
        .await
        .unwrap();
    assert!(!ctx.has_errors());

    let event: Event = next(&mut subscription).await.decode().unwrap();
    assert_eq!(event.event_type, EventType::Update);
    assert_eq!(event.entity["name"], "renamed");
}
