//! Request tracing.
//!
//! Opens an `http_request` span per request and tags both the request and
//! the response with an `X-Request-Id`. An incoming id is kept when it
//! parses as a UUID.

use crate::domain::request_id::{RequestId, REQUEST_ID_HEADER};
use axum::{
    body::Body,
    http::{HeaderValue, Request},
    response::Response,
};
use futures::future::BoxFuture;
use std::task::{Context, Poll};
use std::time::Instant;
use tower::{Layer, Service};
use tracing::{debug, field, info_span, Instrument};

#[derive(Clone, Copy, Default)]
pub struct TracingLayer;

impl<S> Layer<S> for TracingLayer {
    type Service = Traced<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Traced { inner }
    }
}

#[derive(Clone)]
pub struct Traced<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for Traced<S>
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

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let incoming = req
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok());
        let request_id = RequestId::from_header(incoming);
        let tag = HeaderValue::from_str(&request_id.to_string()).ok();

        if let Some(tag) = &tag {
            req.headers_mut().insert(REQUEST_ID_HEADER, tag.clone());
        }
        req.extensions_mut().insert(request_id);

        let span = info_span!(
            "http_request",
            method = %req.method(),
            path = %req.uri().path(),
            %request_id,
            status = field::Empty,
            elapsed_ms = field::Empty,
        );

        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let started = Instant::now();

        Box::pin(
            async move {
                let result = inner.call(req).await;
                let span = tracing::Span::current();
                span.record("elapsed_ms", started.elapsed().as_millis() as u64);

                result.map(|mut response| {
                    span.record("status", response.status().as_u16());
                    if let Some(tag) = tag {
                        response.headers_mut().insert(REQUEST_ID_HEADER, tag);
                    }
                    debug!("Request finished");
                    response
                })
            }
            .instrument(span),
        )
    }
}
