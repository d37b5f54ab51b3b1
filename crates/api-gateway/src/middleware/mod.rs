//! Middleware stack for the API Gateway.
//!
//! Layer order: Request → Tracing → CORS → RateLimit → BodyLimit → Handler

pub mod cors;
pub mod metrics;
pub mod rate_limit;
pub mod tracing;

pub use cors::{CorsHeaders, CorsLayer};
pub use metrics::{DispatchTimer, GatewayMetrics};
pub use rate_limit::{client_ip, client_ip_from, IpRateLimiter, RateLimitLayer, RateLimiter};
pub use tracing::TracingLayer;

use crate::domain::config::GatewayConfig;
use axum::Router;
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;

/// Middleware stack builder
pub struct MiddlewareStack {
    pub tracing: TracingLayer,
    pub cors: CorsLayer,
    pub rate_limit: RateLimitLayer,
    pub body_limit: RequestBodyLimitLayer,
}

impl MiddlewareStack {
    /// Create middleware stack from gateway config
    pub fn from_config(
        config: &GatewayConfig,
        limiter: Option<Arc<dyn RateLimiter>>,
        metrics: Arc<GatewayMetrics>,
    ) -> Self {
        Self {
            tracing: TracingLayer,
            cors: CorsLayer::new(&config.cors),
            rate_limit: RateLimitLayer::new(limiter, metrics),
            body_limit: RequestBodyLimitLayer::new(config.http.max_body_size),
        }
    }

    /// Wrap `router`. The last layer added runs first.
    pub fn apply<S>(self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router
            .layer(self.body_limit)
            .layer(self.rate_limit)
            .layer(self.cors)
            .layer(self.tracing)
    }
}
