//! Push session manager.
//!
//! Tracks live WebSocket sessions, publishes events of successful writes on
//! the pubsub transport and decides, per session, which publications are
//! delivered.

use crate::auth::{self, SessionAuthenticator};
use crate::domain::config::PushConfig;
use crate::domain::error::ApiError;
use crate::middleware::metrics::GatewayMetrics;
use crate::ports::outbound::{EventPusher, PermissiveSessionsHandler, SessionsHandler};
use crate::push::session::{Session, SessionError, SessionKind, SessionState};
use async_trait::async_trait;
use parking_lot::Mutex;
use shared_bus::{PubSubServer, Publication, Subscription};
use shared_types::Event;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const PUSH_INIT_DENIED: &str = "You are not authorized to initiate a push session";
pub const EMPTY_IDENTIFIER: &str = "cannot register websocket session. empty identifier";
pub const EMPTY_UNREGISTER_IDENTIFIER: &str =
    "cannot unregister websocket session. empty identifier";

/// Registry of live sessions plus the publish and delivery pipeline.
pub struct SessionManager {
    sessions: Mutex<HashMap<String, Arc<Session>>>,
    handler: Arc<dyn SessionsHandler>,
    authenticators: Vec<Arc<dyn SessionAuthenticator>>,
    pubsub: Option<Arc<dyn PubSubServer>>,
    config: PushConfig,
    metrics: Arc<GatewayMetrics>,
}

impl SessionManager {
    pub fn new(config: PushConfig) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            handler: Arc::new(PermissiveSessionsHandler),
            authenticators: Vec::new(),
            pubsub: None,
            config,
            metrics: Arc::new(GatewayMetrics::new()),
        }
    }

    pub fn with_handler(mut self, handler: Arc<dyn SessionsHandler>) -> Self {
        self.handler = handler;
        self
    }

    pub fn with_authenticators(mut self, authenticators: Vec<Arc<dyn SessionAuthenticator>>) -> Self {
        self.authenticators = authenticators;
        self
    }

    pub fn with_pubsub(mut self, pubsub: Arc<dyn PubSubServer>) -> Self {
        self.pubsub = Some(pubsub);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<GatewayMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &PushConfig {
        &self.config
    }

    /// Register a session and mark it active.
    ///
    /// The state change and the insert happen under the registry lock, so a
    /// session closed concurrently is refused instead of registered.
    ///
    /// # Panics
    ///
    /// Panics if the session identifier is empty.
    pub fn register_session(&self, session: Arc<Session>) -> Result<(), SessionError> {
        assert!(!session.id().is_empty(), "{EMPTY_IDENTIFIER}");

        {
            let mut sessions = self.sessions.lock();
            if session.state() == SessionState::Connecting {
                session.transition(SessionState::Authenticating)?;
            }
            if session.state() != SessionState::Active {
                session.transition(SessionState::Active)?;
            }
            sessions.insert(session.id().to_string(), Arc::clone(&session));

            match session.kind() {
                SessionKind::Push => self.metrics.record_push_session_open(),
                SessionKind::Api => self.metrics.record_api_session_open(),
            }
        }

        if session.kind() == SessionKind::Push {
            self.handler.on_push_session_start(&session);
        }

        info!(session_id = %session.id(), kind = ?session.kind(), "Session registered");
        Ok(())
    }

    /// Remove a session and close it. Unknown sessions are a no-op.
    ///
    /// # Panics
    ///
    /// Panics if the session identifier is empty.
    pub fn unregister_session(&self, session: &Session) {
        assert!(!session.id().is_empty(), "{EMPTY_UNREGISTER_IDENTIFIER}");

        let removed = {
            let mut sessions = self.sessions.lock();
            let removed = sessions.remove(session.id());
            session.close();

            if let Some(removed) = &removed {
                match removed.kind() {
                    SessionKind::Push => self.metrics.record_push_session_close(),
                    SessionKind::Api => self.metrics.record_api_session_close(),
                }
            }
            removed
        };

        let Some(removed) = removed else {
            return;
        };
        if removed.kind() == SessionKind::Push {
            self.handler.on_push_session_stop(&removed);
        }

        info!(session_id = %session.id(), "Session unregistered");
    }

    /// Run the session authenticators. A rejected session is closed.
    pub async fn authenticate_session(&self, session: &Session) -> Result<(), ApiError> {
        if session.state() == SessionState::Connecting {
            session
                .transition(SessionState::Authenticating)
                .map_err(|e| ApiError::unauthorized(e.to_string()))?;
        }

        if let Err(err) = auth::authenticate_session(&self.authenticators, session).await {
            warn!(session_id = %session.id(), error = %err, "Session rejected");
            session.close();
            return Err(err);
        }
        Ok(())
    }

    /// Ask the sessions handler whether a push session may start.
    pub async fn init_push_session(&self, session: &Session) -> Result<(), ApiError> {
        let outcome = match self.handler.on_push_session_init(session).await {
            Ok(true) => return Ok(()),
            Ok(false) => ApiError::forbidden(PUSH_INIT_DENIED),
            Err(e) => ApiError::forbidden(e.to_string()),
        };

        warn!(session_id = %session.id(), error = %outcome, "Push session refused");
        session.close();
        Err(outcome)
    }

    /// Publish one event on the push topic. Never fails; problems are logged.
    pub async fn push_event(&self, event: Event) {
        let Some(pubsub) = &self.pubsub else {
            return;
        };
        if !self.config.publish_enabled {
            return;
        }

        match self.handler.should_publish(&event).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(identity = %event.identity, "Event filtered before publication");
                self.metrics.record_event_suppressed();
                return;
            }
            Err(e) => {
                warn!(identity = %event.identity, error = %e, "Publish filter failed");
                self.metrics.record_event_suppressed();
                return;
            }
        }

        let mut publication = Publication::new(self.config.topic.as_str());
        if let Err(e) = publication.encode(&event) {
            warn!(identity = %event.identity, error = %e, "Unable to encode event");
            return;
        }

        match pubsub.publish(publication).await {
            Ok(()) => self.metrics.record_event_pushed(),
            Err(e) => warn!(topic = %self.config.topic, error = %e, "Unable to publish event"),
        }
    }

    /// Subscribe to the push topic, if a transport is configured.
    pub fn subscribe(&self) -> Option<Subscription> {
        self.pubsub
            .as_ref()
            .map(|pubsub| pubsub.subscribe(&self.config.topic))
    }

    /// JSON text to send to `session` for `publication`, if it should get it.
    pub async fn deliverable(&self, session: &Session, publication: &Publication) -> Option<String> {
        if !self.config.dispatch_enabled || !self.is_live(session) {
            return None;
        }

        let event: Event = match publication.decode() {
            Ok(event) => event,
            Err(e) => {
                warn!(session_id = %session.id(), error = %e, "Undecodable publication");
                return None;
            }
        };

        match self.handler.should_push(session, &event).await {
            Ok(true) => {}
            Ok(false) => return None,
            Err(e) => {
                warn!(session_id = %session.id(), error = %e, "Push filter failed");
                return None;
            }
        }

        match serde_json::to_string(&event) {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(session_id = %session.id(), error = %e, "Unable to encode event");
                None
            }
        }
    }

    /// Registered and still active, read under the registry lock.
    fn is_live(&self, session: &Session) -> bool {
        let sessions = self.sessions.lock();
        sessions.contains_key(session.id()) && session.state() == SessionState::Active
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.sessions.lock().contains_key(id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Snapshot of the registered sessions.
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.sessions.lock().values().cloned().collect()
    }
}

#[async_trait]
impl EventPusher for SessionManager {
    async fn push_events(&self, events: Vec<Event>) {
        for event in events {
            self.push_event(event).await;
        }
    }
}
