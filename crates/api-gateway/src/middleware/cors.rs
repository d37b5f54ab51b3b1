//! Common response headers.
//!
//! Every response leaves the gateway with a JSON content type and the CORS
//! headers built from [`CorsConfig`]. The allowed origin echoes the request's
//! `Origin` and falls back to the configured one.

use crate::domain::config::CorsConfig;
use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, Request, StatusCode},
    response::Response,
};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

pub const JSON_CONTENT_TYPE: &str = "application/json; charset=UTF-8";

/// Pre-encoded header values.
#[derive(Debug, Clone)]
pub struct CorsHeaders {
    default_origin: HeaderValue,
    expose_headers: HeaderValue,
    allow_methods: HeaderValue,
    allow_headers: HeaderValue,
    allow_credentials: bool,
    max_age: HeaderValue,
}

impl CorsHeaders {
    pub fn from_config(config: &CorsConfig) -> Self {
        Self {
            default_origin: encode(&config.allowed_origin),
            expose_headers: encode(&config.expose_headers.join(", ")),
            allow_methods: encode(&config.allow_methods.join(", ")),
            allow_headers: encode(&config.allow_headers.join(", ")),
            allow_credentials: config.allow_credentials,
            max_age: HeaderValue::from(config.max_age),
        }
    }

    /// Write the common headers into `headers`.
    ///
    /// A content type already set by the handler is kept.
    pub fn apply(&self, origin: Option<&HeaderValue>, headers: &mut HeaderMap) {
        if !headers.contains_key(header::CONTENT_TYPE) {
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static(JSON_CONTENT_TYPE),
            );
        }
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            origin.cloned().unwrap_or_else(|| self.default_origin.clone()),
        );
        headers.insert(
            header::ACCESS_CONTROL_EXPOSE_HEADERS,
            self.expose_headers.clone(),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            self.allow_methods.clone(),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            self.allow_headers.clone(),
        );
        headers.insert(header::ACCESS_CONTROL_MAX_AGE, self.max_age.clone());
        if self.allow_credentials {
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
        }
    }
}

fn encode(value: &str) -> HeaderValue {
    HeaderValue::from_str(value).unwrap_or_else(|_| HeaderValue::from_static(""))
}

/// Layer stamping the common headers on every response.
#[derive(Clone)]
pub struct CorsLayer {
    headers: Arc<CorsHeaders>,
}

impl CorsLayer {
    pub fn new(config: &CorsConfig) -> Self {
        Self {
            headers: Arc::new(CorsHeaders::from_config(config)),
        }
    }
}

impl<S> Layer<S> for CorsLayer {
    type Service = CorsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CorsService {
            inner,
            headers: Arc::clone(&self.headers),
        }
    }
}

#[derive(Clone)]
pub struct CorsService<S> {
    inner: S,
    headers: Arc<CorsHeaders>,
}

impl<S> Service<Request<Body>> for CorsService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let origin = req.headers().get(header::ORIGIN).cloned();
        let headers = Arc::clone(&self.headers);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let mut response = inner.call(req).await?;
            // Upgraded sockets carry no body.
            if response.status() != StatusCode::SWITCHING_PROTOCOLS {
                headers.apply(origin.as_ref(), response.headers_mut());
            }
            Ok(response)
        })
    }
}
