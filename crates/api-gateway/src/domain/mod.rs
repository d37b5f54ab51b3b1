//! Domain types for the API Gateway.
//!
//! Requests, contexts, configuration and errors. Nothing in here touches a
//! socket.

pub mod config;
pub mod context;
pub mod error;
pub mod request;
pub mod request_id;

pub use config::{
    CorsConfig, GatewayConfig, HealthConfig, HttpConfig, MetaConfig, ModelConfig, PushConfig,
    RateLimitConfig, WebSocketConfig,
};
pub use context::{Context, ContextError, Count, Page, PageLinks, Payload, RenderedResponse};
pub use error::{ApiError, ApiResult, GatewayError};
pub use request::{OperationRequest, RawRequest, RoutePath};
pub use request_id::{RequestId, REQUEST_ID_HEADER};
