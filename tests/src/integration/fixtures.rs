//! # Test Fixtures
//!
//! A two-level todo model (lists owning tasks) served by in-memory
//! processors, plus small collaborator doubles with call counters.

use api_gateway::{
    ApiError, AuditRecord, Auditer, Context, GatewayConfig, Processor, ProcessorRegistry,
    RawRequest, RequestAuthenticator, RoutePath, Verdict,
};
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::Response,
    Router,
};
use parking_lot::Mutex;
use serde_json::Value;
use shared_types::{
    Event, EventType, Identity, Operation, Relationship, RelationshipsRegistry,
    VersionedRelationships,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tower::ServiceExt;

pub const TOKEN: &str = "Bearer let-me-in";

pub fn list() -> Identity {
    Identity::new("list", "lists")
}

pub fn task() -> Identity {
    Identity::new("task", "tasks")
}

/// Lists live under the root, tasks under a list.
pub fn relationships() -> VersionedRelationships {
    let root = Identity::root();
    let registry = RelationshipsRegistry::builder()
        .identity(
            list(),
            Relationship::new()
                .retrieve()
                .update()
                .delete()
                .create_under(&root)
                .retrieve_many_under(&root),
        )
        .identity(
            task(),
            Relationship::new()
                .retrieve()
                .update()
                .delete()
                .create_under(&list())
                .retrieve_many_under(&list()),
        )
        .build()
        .unwrap();
    VersionedRelationships::single(registry)
}

// =============================================================================
// PROCESSORS
// =============================================================================

/// Keeps the objects of one identity in memory.
pub struct MemoryStore {
    identity: Identity,
    items: Mutex<BTreeMap<String, Value>>,
    next_id: AtomicU64,
    pub calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            items: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    fn object_id(ctx: &Context) -> Result<String, ApiError> {
        ctx.request()
            .object_id
            .clone()
            .ok_or_else(|| ApiError::bad_request("Missing object id"))
    }

    fn event(&self, ctx: &mut Context, event_type: EventType, entity: &Value) {
        ctx.enqueue_event(Event::from_value(event_type, &self.identity, entity.clone()));
    }
}

#[async_trait]
impl Processor for MemoryStore {
    async fn process(&self, ctx: &mut Context) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        match ctx.operation() {
            Operation::Create => {
                let mut entity: Value = ctx.request().decode()?;
                let id = format!(
                    "{}-{}",
                    self.identity.name,
                    self.next_id.fetch_add(1, Ordering::SeqCst)
                );
                entity["id"] = Value::from(id.clone());
                if let Some(parent) = ctx.request().parent_id.clone() {
                    entity["parent"] = Value::from(parent);
                }
                self.items.lock().insert(id, entity.clone());
                self.event(ctx, EventType::Create, &entity);
                ctx.set_status(StatusCode::CREATED);
                ctx.set_output(entity);
            }
            Operation::Retrieve => {
                let id = Self::object_id(ctx)?;
                let item = self.items.lock().get(&id).cloned();
                ctx.set_output(item.ok_or_else(ApiError::not_found)?);
            }
            Operation::RetrieveMany => {
                let parent = ctx.request().parent_id.clone();
                let matching: Vec<Value> = self
                    .items
                    .lock()
                    .values()
                    .filter(|item| match &parent {
                        Some(parent) => item["parent"] == Value::from(parent.as_str()),
                        None => true,
                    })
                    .cloned()
                    .collect();

                let skip = (ctx.page.current - 1) * ctx.page.size;
                ctx.count.total = matching.len() as u64;
                let page: Vec<Value> = matching
                    .into_iter()
                    .skip(skip as usize)
                    .take(ctx.page.size as usize)
                    .collect();
                ctx.set_output_list(page);
            }
            Operation::Update => {
                let id = Self::object_id(ctx)?;
                let mut entity: Value = ctx.request().decode()?;
                entity["id"] = Value::from(id.clone());
                let mut items = self.items.lock();
                let Some(current) = items.get_mut(&id) else {
                    return Err(ApiError::not_found().into());
                };
                if let Some(parent) = current.get("parent").cloned() {
                    entity["parent"] = parent;
                }
                *current = entity.clone();
                drop(items);
                self.event(ctx, EventType::Update, &entity);
                ctx.set_output(entity);
            }
            Operation::Delete => {
                let id = Self::object_id(ctx)?;
                let removed = self.items.lock().remove(&id);
                let entity = removed.ok_or_else(ApiError::not_found)?;
                self.event(ctx, EventType::Delete, &entity);
                ctx.set_output(entity);
            }
            other => anyhow::bail!("{} is not supported", other.label()),
        }

        Ok(())
    }
}

/// Panics on every call.
pub struct Exploding;

#[async_trait]
impl Processor for Exploding {
    async fn process(&self, _ctx: &mut Context) -> anyhow::Result<()> {
        panic!("storage corrupted");
    }
}

pub fn registry(lists: Arc<MemoryStore>, tasks: Arc<MemoryStore>) -> ProcessorRegistry {
    ProcessorRegistry::new()
        .register(&list(), lists)
        .register(&task(), tasks)
}

// =============================================================================
// COLLABORATOR DOUBLES
// =============================================================================

/// Allows requests carrying [`TOKEN`], denies the rest.
#[derive(Default)]
pub struct BearerAuth {
    pub calls: AtomicUsize,
}

#[async_trait]
impl RequestAuthenticator for BearerAuth {
    async fn authenticate_request(&self, ctx: &Context) -> anyhow::Result<Verdict> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(match ctx.request().header("authorization") {
            Some(TOKEN) => Verdict::Allow,
            _ => Verdict::Deny,
        })
    }
}

/// Forwards audit records to a channel.
pub struct ChannelAuditer(pub mpsc::UnboundedSender<AuditRecord>);

#[async_trait]
impl Auditer for ChannelAuditer {
    async fn audit(&self, record: AuditRecord) -> anyhow::Result<()> {
        let _ = self.0.send(record);
        Ok(())
    }
}

// =============================================================================
// HELPERS
// =============================================================================

/// Gateway config with logging installed once per test binary.
pub fn config() -> GatewayConfig {
    let telemetry = gateway_telemetry::TelemetryConfig {
        log_level: "api_gateway=debug,shared_bus=debug".to_string(),
        console_output: false,
        ..gateway_telemetry::TelemetryConfig::from_env()
    };
    gateway_telemetry::init_tracing(&telemetry).unwrap();
    GatewayConfig::default()
}

pub fn raw(category: &str, id: Option<&str>) -> RawRequest {
    RawRequest {
        route: RoutePath {
            category: category.to_string(),
            id: id.map(str::to_string),
            ..RoutePath::default()
        },
        ..RawRequest::default()
    }
}

pub fn raw_with_body(category: &str, body: Value) -> RawRequest {
    RawRequest {
        body: serde_json::to_vec(&body).unwrap().into(),
        ..raw(category, None)
    }
}

pub async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> Response {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("host", "todo.test")
        .header("authorization", TOKEN)
        .header("x-forwarded-for", "203.0.113.7");
    if body.is_some() {
        builder = builder.header("content-type", "application/json");
    }
    let body = body.map_or_else(Body::empty, |b| Body::from(b.to_string()));

    app.clone().oneshot(builder.body(body).unwrap()).await.unwrap()
}

pub async fn json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    }
}
