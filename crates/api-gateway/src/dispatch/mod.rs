//! Operation dispatcher.
//!
//! Every operation runs the same pipeline:
//!
//! ```text
//! parse -> default parent -> read-only -> relationships -> processor lookup
//!       -> authenticate -> authorize -> process -> audit -> push
//! ```
//!
//! Failures after parsing are recorded on the [`Context`] and rendered like
//! any other response. A panic anywhere in the pipeline is caught at
//! [`Dispatcher::dispatch`] and turned into a 500, unless recovery was
//! switched off with [`Dispatcher::with_panic_recovery`].

use crate::auth::{self, Authorizer, RequestAuthenticator};
use crate::domain::config::ModelConfig;
use crate::domain::context::Context;
use crate::domain::error::ApiError;
use crate::domain::request::{OperationRequest, RawRequest};
use crate::middleware::metrics::{DispatchTimer, GatewayMetrics};
use crate::ports::outbound::{AuditRecord, Auditer, EventPusher, ProcessorFinder};
use futures::FutureExt;
use shared_types::{Event, Identity, Operation, VersionedRelationships};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Result of a dispatch. `Err` means no usable context was produced.
pub type DispatchOutcome = Result<Context, ApiError>;

/// Runs operations against the processors.
pub struct Dispatcher {
    relationships: Arc<VersionedRelationships>,
    processors: Arc<dyn ProcessorFinder>,
    authenticators: Vec<Arc<dyn RequestAuthenticator>>,
    authorizers: Vec<Arc<dyn Authorizer>>,
    auditer: Option<Arc<dyn Auditer>>,
    pusher: Option<Arc<dyn EventPusher>>,
    model: ModelConfig,
    metrics: Arc<GatewayMetrics>,
    recover_panics: bool,
}

impl Dispatcher {
    pub fn new(
        relationships: Arc<VersionedRelationships>,
        processors: Arc<dyn ProcessorFinder>,
    ) -> Self {
        Self {
            relationships,
            processors,
            authenticators: Vec::new(),
            authorizers: Vec::new(),
            auditer: None,
            pusher: None,
            model: ModelConfig::default(),
            metrics: Arc::new(GatewayMetrics::new()),
            recover_panics: true,
        }
    }

    pub fn with_authenticators(mut self, authenticators: Vec<Arc<dyn RequestAuthenticator>>) -> Self {
        self.authenticators = authenticators;
        self
    }

    pub fn with_authorizers(mut self, authorizers: Vec<Arc<dyn Authorizer>>) -> Self {
        self.authorizers = authorizers;
        self
    }

    pub fn with_auditer(mut self, auditer: Arc<dyn Auditer>) -> Self {
        self.auditer = Some(auditer);
        self
    }

    pub fn with_pusher(mut self, pusher: Arc<dyn EventPusher>) -> Self {
        self.pusher = Some(pusher);
        self
    }

    pub fn with_model(mut self, model: ModelConfig) -> Self {
        self.model = model;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<GatewayMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_panic_recovery(mut self, enabled: bool) -> Self {
        self.recover_panics = enabled;
        self
    }

    pub fn relationships(&self) -> &VersionedRelationships {
        &self.relationships
    }

    /// Run `operation` for `raw`.
    pub async fn dispatch(&self, operation: Operation, raw: RawRequest) -> DispatchOutcome {
        let request_id = raw.request_id;
        let timer = DispatchTimer::start(Arc::clone(&self.metrics), operation.is_write());

        if !self.recover_panics {
            let outcome = self.run(operation, raw).await;
            timer.finish(matches!(&outcome, Ok(ctx) if !ctx.has_errors()));
            return outcome;
        }

        let outcome = match AssertUnwindSafe(self.run(operation, raw))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                self.metrics.record_panic();
                error!(
                    %request_id,
                    operation = operation.as_str(),
                    panic = %message,
                    "Recovered from panic during dispatch"
                );
                Err(ApiError::internal(message))
            }
        };

        timer.finish(matches!(&outcome, Ok(ctx) if !ctx.has_errors()));
        outcome
    }

    pub async fn dispatch_create(&self, raw: RawRequest) -> DispatchOutcome {
        self.dispatch(Operation::Create, raw).await
    }

    pub async fn dispatch_retrieve(&self, raw: RawRequest) -> DispatchOutcome {
        self.dispatch(Operation::Retrieve, raw).await
    }

    pub async fn dispatch_retrieve_many(&self, raw: RawRequest) -> DispatchOutcome {
        self.dispatch(Operation::RetrieveMany, raw).await
    }

    pub async fn dispatch_update(&self, raw: RawRequest) -> DispatchOutcome {
        self.dispatch(Operation::Update, raw).await
    }

    pub async fn dispatch_delete(&self, raw: RawRequest) -> DispatchOutcome {
        self.dispatch(Operation::Delete, raw).await
    }

    pub async fn dispatch_patch(&self, raw: RawRequest) -> DispatchOutcome {
        self.dispatch(Operation::Patch, raw).await
    }

    pub async fn dispatch_info(&self, raw: RawRequest) -> DispatchOutcome {
        self.dispatch(Operation::Info, raw).await
    }

    async fn run(&self, operation: Operation, raw: RawRequest) -> DispatchOutcome {
        let mut request = OperationRequest::parse(raw, &self.relationships)?;
        if operation.is_parent_scoped() && request.parent_identity.is_none() {
            request.parent_identity = Some(Identity::root());
        }

        let mut ctx = Context::from_request(operation, request)?;

        if let Err(err) = self.execute(&mut ctx).await {
            debug!(
                request_id = %ctx.request().request_id,
                operation = operation.as_str(),
                identity = %ctx.request().identity.name,
                error = %err,
                "Operation failed"
            );
            ctx.add_error(err);
        }

        self.audit(&ctx);

        if !ctx.has_errors() && operation != Operation::Info {
            self.push(ctx.take_events());
        }

        Ok(ctx)
    }

    async fn execute(&self, ctx: &mut Context) -> Result<(), ApiError> {
        let operation = ctx.operation();
        let request = ctx.request();

        if operation.is_write() && self.model.is_locked(&request.identity) {
            return Err(ApiError::locked());
        }

        if !self.relationships.is_allowed(
            request.version,
            &request.identity,
            request.parent_identity.as_ref(),
            operation,
        ) {
            return Err(not_allowed(operation, &request.identity));
        }

        let processor = self.processors.find(&request.identity).ok_or_else(|| {
            ApiError::internal(format!(
                "No processor registered for identity {}",
                request.identity.name
            ))
        })?;

        auth::authenticate_request(&self.authenticators, ctx).await?;
        auth::authorize(&self.authorizers, ctx).await?;

        processor
            .process(ctx)
            .await
            .map_err(|e| match e.downcast::<ApiError>() {
                Ok(api) => api,
                Err(other) => ApiError::internal(other.to_string()),
            })
    }

    fn audit(&self, ctx: &Context) {
        let Some(auditer) = &self.auditer else {
            return;
        };
        let auditer = Arc::clone(auditer);
        let record = AuditRecord::from_context(ctx);

        tokio::spawn(async move {
            let request_id = record.request_id.clone();
            if let Err(e) = auditer.audit(record).await {
                warn!(%request_id, error = %e, "Audit failed");
            }
        });
    }

    fn push(&self, events: Vec<Event>) {
        if events.is_empty() {
            return;
        }
        let Some(pusher) = &self.pusher else {
            return;
        };
        let pusher = Arc::clone(pusher);

        tokio::spawn(async move {
            pusher.push_events(events).await;
        });
    }
}

/// `405` naming the identity, or its category for collection reads.
fn not_allowed(operation: Operation, identity: &Identity) -> ApiError {
    let target = match operation {
        Operation::RetrieveMany | Operation::Info => &identity.category,
        _ => &identity.name,
    };
    ApiError::method_not_allowed(format!(
        "{} operation not allowed on {}",
        operation.label(),
        target
    ))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic during dispatch".to_string()
    }
}
