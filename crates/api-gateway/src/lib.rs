//! Resource API Gateway.
//!
//! Turns HTTP and WebSocket requests into operations on resources, checks
//! them against the relationship registry and the auth chains, and hands
//! them to the processor registered for the addressed identity. Successful
//! writes become change events pushed to subscribed WebSocket sessions.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              API GATEWAY                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │   ┌─────────────┐   ┌─────────────┐   ┌─────────────┐                   │
//! │   │    REST     │   │   /wsapi    │   │   /events   │                   │
//! │   └──────┬──────┘   └──────┬──────┘   └──────┬──────┘                   │
//! │          │                 │                 │                          │
//! │   ┌──────┴─────────────────┴──────┐          │                          │
//! │   │       Middleware Stack        │          │                          │
//! │   │ Tracing → CORS → RateLimit    │          │                          │
//! │   └──────────────┬────────────────┘          │                          │
//! │                  │                           │                          │
//! │   ┌──────────────┴────────────────┐   ┌──────┴──────────────┐           │
//! │   │          Dispatcher           │──►│   Session Manager   │           │
//! │   │ parse → relationships → auth  │   │  registry + hooks   │           │
//! │   │ → processor (panic boundary)  │   └──────┬──────────────┘           │
//! │   └──────────────┬────────────────┘          │                          │
//! └──────────────────┼───────────────────────────┼──────────────────────────┘
//!                    │                           │
//!               Processors                 PubSub transport
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use api_gateway::{GatewayBuilder, GatewayConfig};
//!
//! let service = GatewayBuilder::new(GatewayConfig::default(), relationships)
//!     .with_processors(Arc::new(processors))
//!     .with_pubsub(Arc::new(InMemoryPubSub::new()))
//!     .build()?;
//! let listener = tokio::net::TcpListener::bind(service.config().http_addr()).await?;
//! service.serve(listener, shutdown_signal()).await?;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod auth;
pub mod dispatch;
pub mod domain;
pub mod middleware;
pub mod ports;
pub mod push;
pub mod rest;
pub mod service;

// Re-exports for public API
pub use auth::{Authorizer, RequestAuthenticator, SessionAuthenticator, Verdict};
pub use dispatch::{DispatchOutcome, Dispatcher};
pub use domain::config::GatewayConfig;
pub use domain::context::Context;
pub use domain::error::{ApiError, ApiResult, GatewayError};
pub use domain::request::{OperationRequest, RawRequest, RoutePath};
pub use domain::request_id::RequestId;
pub use middleware::{GatewayMetrics, IpRateLimiter, RateLimiter};
pub use ports::outbound::{
    AuditRecord, Auditer, EventPusher, HealthCheck, Processor, ProcessorFinder,
    ProcessorRegistry, SessionsHandler,
};
pub use push::{Session, SessionKind, SessionManager, SessionState};
pub use service::{AppState, GatewayBuilder, GatewayService};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
