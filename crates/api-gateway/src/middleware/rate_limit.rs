//! Rate limiting gate.
//!
//! Runs before routing. The decision is delegated to a [`RateLimiter`];
//! [`IpRateLimiter`] is the stock implementation, one governor token bucket
//! per client IP.

use crate::domain::config::RateLimitConfig;
use crate::domain::error::ApiError;
use crate::middleware::metrics::GatewayMetrics;
use crate::rest::response::error_response;
use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{HeaderMap, HeaderValue, Request},
    response::Response,
};
use dashmap::DashMap;
use futures::future::BoxFuture;
use governor::{clock::DefaultClock, state::direct::NotKeyed, state::InMemoryState, Quota};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tower::{Layer, Service};
use tracing::{debug, warn};

/// Seconds advertised in `Retry-After` when limited.
pub const RETRY_AFTER_SECS: u64 = 1;

/// Decides whether a request is over its rate limit.
pub trait RateLimiter: Send + Sync {
    /// `Ok(true)` when the request must be refused.
    fn rate_limit(&self, req: &Request<Body>) -> anyhow::Result<bool>;
}

type DirectLimiter = governor::RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

struct Bucket {
    gate: DirectLimiter,
    touched: Instant,
}

/// Per-IP limiter backed by governor.
pub struct IpRateLimiter {
    quota: Quota,
    buckets: DashMap<IpAddr, Bucket>,
    config: RateLimitConfig,
}

impl IpRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let per_second = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(config.burst_size).unwrap_or(NonZeroU32::MIN);

        Self {
            quota: Quota::per_second(per_second).allow_burst(burst),
            buckets: DashMap::new(),
            config,
        }
    }

    fn exempt(&self, ip: &IpAddr) -> bool {
        !self.config.enabled || self.config.whitelist.contains(ip)
    }

    /// Take one token for `ip`. False once its bucket is empty.
    pub fn allows(&self, ip: IpAddr) -> bool {
        if self.exempt(&ip) {
            return true;
        }

        let mut bucket = self.buckets.entry(ip).or_insert_with(|| {
            debug!(%ip, "New rate limit bucket");
            Bucket {
                gate: DirectLimiter::direct(self.quota),
                touched: Instant::now(),
            }
        });
        bucket.touched = Instant::now();
        bucket.gate.check().is_ok()
    }

    /// Forget buckets untouched for longer than `max_age`.
    pub fn cleanup(&self, max_age: Duration) {
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| bucket.touched.elapsed() <= max_age);

        let dropped = before.saturating_sub(self.buckets.len());
        if dropped > 0 {
            debug!(dropped, remaining = self.buckets.len(), "Swept idle rate limit buckets");
        }
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

impl RateLimiter for IpRateLimiter {
    fn rate_limit(&self, req: &Request<Body>) -> anyhow::Result<bool> {
        let ip = client_ip(req).unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
        Ok(!self.allows(ip))
    }
}

/// Sweep idle buckets every `cleanup_interval` until aborted.
pub async fn cleanup_task(limiter: Arc<IpRateLimiter>) {
    let mut ticker = tokio::time::interval(limiter.config.cleanup_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        limiter.cleanup(limiter.config.max_bucket_age);
    }
}

/// Tower layer consulting a [`RateLimiter`] before the routes.
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: Option<Arc<dyn RateLimiter>>,
    metrics: Arc<GatewayMetrics>,
}

impl RateLimitLayer {
    /// A layer that lets everything through when `limiter` is `None`.
    pub fn new(limiter: Option<Arc<dyn RateLimiter>>, metrics: Arc<GatewayMetrics>) -> Self {
        Self { limiter, metrics }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            gate: self.clone(),
        }
    }
}

#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    gate: RateLimitLayer,
}

impl<S> Service<Request<Body>> for RateLimitService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let verdict = self
            .gate
            .limiter
            .as_ref()
            .map_or(Ok(false), |limiter| limiter.rate_limit(&req));

        let refused = match verdict {
            Ok(false) => None,
            Ok(true) => {
                self.gate.metrics.record_rate_limit_rejection();
                warn!(ip = ?client_ip(&req), path = %req.uri().path(), "Request rate limited");
                Some(too_many_requests())
            }
            Err(e) => {
                warn!(error = %e, "Rate limiter failed");
                Some(error_response(&ApiError::internal(e.to_string())))
            }
        };

        // Keep the polled-ready service for this call.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        Box::pin(async move {
            match refused {
                Some(response) => Ok(response),
                None => inner.call(req).await,
            }
        })
    }
}

/// Client IP of a request. See [`client_ip_from`].
pub fn client_ip<B>(req: &Request<B>) -> Option<IpAddr> {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    client_ip_from(req.headers(), peer)
}

/// Client IP: first `X-Forwarded-For` hop, then `X-Real-IP`, then the socket peer.
pub fn client_ip_from(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<IpAddr> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    header("x-forwarded-for")
        .and_then(|hops| hops.split(',').next())
        .and_then(|hop| hop.trim().parse().ok())
        .or_else(|| header("x-real-ip").and_then(|v| v.trim().parse().ok()))
        .or_else(|| peer.map(|addr| addr.ip()))
}

fn too_many_requests() -> Response {
    let mut response = error_response(&ApiError::too_many_requests());
    response
        .headers_mut()
        .insert("retry-after", HeaderValue::from(RETRY_AFTER_SECS));
    response
}
