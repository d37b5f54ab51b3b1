//! Gateway assembly.
//!
//! [`GatewayBuilder`] collects the injected collaborators, validates the
//! configuration and yields a [`GatewayService`] holding the dispatcher, the
//! session manager and the full axum application.

use crate::auth::{Authorizer, RequestAuthenticator, SessionAuthenticator};
use crate::dispatch::Dispatcher;
use crate::domain::config::GatewayConfig;
use crate::domain::error::GatewayError;
use crate::middleware::rate_limit::cleanup_task;
use crate::middleware::{GatewayMetrics, IpRateLimiter, MiddlewareStack, RateLimiter};
use crate::ports::outbound::{
    Auditer, EventPusher, HealthCheck, PermissiveSessionsHandler, ProcessorFinder, ProcessorRegistry,
    SessionsHandler,
};
use crate::push::SessionManager;
use crate::rest;
use axum::Router;
use shared_bus::PubSubServer;
use shared_types::VersionedRelationships;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// State shared by every HTTP and WebSocket handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub dispatcher: Arc<Dispatcher>,
    pub sessions: Arc<SessionManager>,
    pub metrics: Arc<GatewayMetrics>,
    pub health: Option<Arc<dyn HealthCheck>>,
}

/// Builder for [`GatewayService`].
pub struct GatewayBuilder {
    config: GatewayConfig,
    relationships: VersionedRelationships,
    processors: Arc<dyn ProcessorFinder>,
    authenticators: Vec<Arc<dyn RequestAuthenticator>>,
    authorizers: Vec<Arc<dyn Authorizer>>,
    session_authenticators: Vec<Arc<dyn SessionAuthenticator>>,
    auditer: Option<Arc<dyn Auditer>>,
    rate_limiter: Option<Arc<dyn RateLimiter>>,
    sessions_handler: Arc<dyn SessionsHandler>,
    pubsub: Option<Arc<dyn PubSubServer>>,
    health: Option<Arc<dyn HealthCheck>>,
}

impl GatewayBuilder {
    pub fn new(config: GatewayConfig, relationships: VersionedRelationships) -> Self {
        Self {
            config,
            relationships,
            processors: Arc::new(ProcessorRegistry::new()),
            authenticators: Vec::new(),
            authorizers: Vec::new(),
            session_authenticators: Vec::new(),
            auditer: None,
            rate_limiter: None,
            sessions_handler: Arc::new(PermissiveSessionsHandler),
            pubsub: None,
            health: None,
        }
    }

    pub fn with_processors(mut self, processors: Arc<dyn ProcessorFinder>) -> Self {
        self.processors = processors;
        self
    }

    pub fn with_authenticators(mut self, authenticators: Vec<Arc<dyn RequestAuthenticator>>) -> Self {
        self.authenticators = authenticators;
        self
    }

    pub fn with_authorizers(mut self, authorizers: Vec<Arc<dyn Authorizer>>) -> Self {
        self.authorizers = authorizers;
        self
    }

    pub fn with_session_authenticators(
        mut self,
        authenticators: Vec<Arc<dyn SessionAuthenticator>>,
    ) -> Self {
        self.session_authenticators = authenticators;
        self
    }

    pub fn with_auditer(mut self, auditer: Arc<dyn Auditer>) -> Self {
        self.auditer = Some(auditer);
        self
    }

    /// Replace the per-IP limiter built from `rate_limit` config.
    pub fn with_rate_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    pub fn with_sessions_handler(mut self, handler: Arc<dyn SessionsHandler>) -> Self {
        self.sessions_handler = handler;
        self
    }

    pub fn with_pubsub(mut self, pubsub: Arc<dyn PubSubServer>) -> Self {
        self.pubsub = Some(pubsub);
        self
    }

    pub fn with_health_check(mut self, health: Arc<dyn HealthCheck>) -> Self {
        self.health = Some(health);
        self
    }

    /// Validate the configuration and wire everything together.
    pub fn build(self) -> Result<GatewayService, GatewayError> {
        self.config.validate()?;

        let metrics = Arc::new(GatewayMetrics::new());

        let mut sessions = SessionManager::new(self.config.push.clone())
            .with_handler(self.sessions_handler)
            .with_authenticators(self.session_authenticators)
            .with_metrics(Arc::clone(&metrics));
        if let Some(pubsub) = self.pubsub {
            sessions = sessions.with_pubsub(pubsub);
        }
        let sessions = Arc::new(sessions);

        let mut dispatcher = Dispatcher::new(Arc::new(self.relationships), self.processors)
            .with_authenticators(self.authenticators)
            .with_authorizers(self.authorizers)
            .with_pusher(Arc::clone(&sessions) as Arc<dyn EventPusher>)
            .with_model(self.config.model.clone())
            .with_metrics(Arc::clone(&metrics))
            .with_panic_recovery(!self.config.general.panic_recovery_disabled);
        if let Some(auditer) = self.auditer {
            dispatcher = dispatcher.with_auditer(auditer);
        }

        let mut ip_limiter = None;
        let rate_limiter = match self.rate_limiter {
            Some(limiter) => Some(limiter),
            None if self.config.rate_limit.enabled => {
                let limiter = Arc::new(IpRateLimiter::new(self.config.rate_limit.clone()));
                ip_limiter = Some(Arc::clone(&limiter));
                Some(limiter as Arc<dyn RateLimiter>)
            }
            None => None,
        };

        let state = AppState {
            config: Arc::new(self.config),
            dispatcher: Arc::new(dispatcher),
            sessions,
            metrics,
            health: self.health,
        };

        Ok(GatewayService {
            state,
            rate_limiter,
            ip_limiter,
        })
    }
}

/// An assembled gateway.
pub struct GatewayService {
    state: AppState,
    rate_limiter: Option<Arc<dyn RateLimiter>>,
    ip_limiter: Option<Arc<IpRateLimiter>>,
}

impl GatewayService {
    /// The full application: routes wrapped in the middleware stack.
    pub fn router(&self) -> Router {
        let stack = MiddlewareStack::from_config(
            &self.state.config,
            self.rate_limiter.clone(),
            Arc::clone(&self.state.metrics),
        );
        stack.apply(rest::router(self.state.clone()))
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::clone(&self.state.dispatcher)
    }

    pub fn sessions(&self) -> Arc<SessionManager> {
        Arc::clone(&self.state.sessions)
    }

    pub fn metrics(&self) -> Arc<GatewayMetrics> {
        Arc::clone(&self.state.metrics)
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.state.config
    }

    /// Serve on `listener` until `shutdown` resolves.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), GatewayError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let cleanup = self
            .ip_limiter
            .clone()
            .map(|limiter| tokio::spawn(cleanup_task(limiter)));

        let addr = listener.local_addr()?;
        info!(addr = %addr, "Starting API Gateway");

        let result = axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await;

        if let Some(handle) = cleanup {
            handle.abort();
        }

        info!("API Gateway stopped");
        result.map_err(GatewayError::from)
    }
}
