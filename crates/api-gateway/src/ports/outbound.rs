//! Outbound ports for the API Gateway.
//!
//! Everything the gateway calls but does not implement: the processors doing
//! the actual work, the audit sink, the push hooks and the health probe.

use crate::domain::context::Context;
use crate::domain::error::ApiError;
use crate::push::Session;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use shared_types::{Event, Identity, Operation};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

/// Handles operations for one identity.
///
/// Returning an [`ApiError`] (through `anyhow`) sends that error to the
/// client as-is. Any other error becomes a 500.
#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(&self, ctx: &mut Context) -> anyhow::Result<()>;
}

/// Resolves the processor for an identity.
pub trait ProcessorFinder: Send + Sync {
    fn find(&self, identity: &Identity) -> Option<Arc<dyn Processor>>;
}

/// Map-backed [`ProcessorFinder`].
#[derive(Default, Clone)]
pub struct ProcessorRegistry {
    processors: HashMap<String, Arc<dyn Processor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route operations on `identity` to `processor`.
    pub fn register(mut self, identity: &Identity, processor: Arc<dyn Processor>) -> Self {
        self.processors.insert(identity.name.clone(), processor);
        self
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }
}

impl ProcessorFinder for ProcessorRegistry {
    fn find(&self, identity: &Identity) -> Option<Arc<dyn Processor>> {
        self.processors.get(&identity.name).cloned()
    }
}

/// What the audit sink receives once per dispatched request.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub request_id: String,
    pub operation: Operation,
    pub identity: String,
    pub object_id: Option<String>,
    pub parent_identity: Option<String>,
    pub parent_id: Option<String>,
    pub client_ip: Option<IpAddr>,
    pub status: u16,
    pub errors: Vec<ApiError>,
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    pub fn from_context(ctx: &Context) -> Self {
        let request = ctx.request();
        Self {
            request_id: request.request_id.to_string(),
            operation: ctx.operation(),
            identity: request.identity.name.clone(),
            object_id: request.object_id.clone(),
            parent_identity: request.parent_identity.as_ref().map(|p| p.name.clone()),
            parent_id: request.parent_id.clone(),
            client_ip: request.client_ip,
            status: ctx.status().as_u16(),
            errors: ctx.errors().to_vec(),
            timestamp: Utc::now(),
        }
    }
}

/// Audit sink. Errors are logged, never surfaced to the client.
#[async_trait]
pub trait Auditer: Send + Sync {
    async fn audit(&self, record: AuditRecord) -> anyhow::Result<()>;
}

/// Receives the events of successful writes.
#[async_trait]
pub trait EventPusher: Send + Sync {
    async fn push_events(&self, events: Vec<Event>);
}

/// Health probe behind the health route.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn check(&self) -> anyhow::Result<()>;
}

/// Hooks into the push session lifecycle. Every hook permits by default.
#[async_trait]
pub trait SessionsHandler: Send + Sync {
    /// Called before a push connection is upgraded.
    async fn on_push_session_init(&self, _session: &Session) -> anyhow::Result<bool> {
        Ok(true)
    }

    fn on_push_session_start(&self, _session: &Session) {}

    fn on_push_session_stop(&self, _session: &Session) {}

    /// Whether `event` is published at all.
    async fn should_publish(&self, _event: &Event) -> anyhow::Result<bool> {
        Ok(true)
    }

    /// Whether `event` is delivered to `session`.
    async fn should_push(&self, _session: &Session, _event: &Event) -> anyhow::Result<bool> {
        Ok(true)
    }
}

/// [`SessionsHandler`] keeping every default.
#[derive(Debug, Default, Clone, Copy)]
pub struct PermissiveSessionsHandler;

impl SessionsHandler for PermissiveSessionsHandler {}
