//! HTTP rendering of contexts and errors.

use crate::domain::context::{Context, RenderedResponse};
use crate::domain::error::ApiError;
use crate::middleware::cors::JSON_CONTENT_TYPE;
use axum::{
    body::Body,
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
};
use tracing::error;

/// Render a context. A body that fails to encode becomes a 500.
pub fn context_response(ctx: &Context) -> Response {
    match ctx.serialize() {
        Ok(rendered) => rendered_response(rendered),
        Err(e) => {
            error!(
                request_id = %ctx.request().request_id,
                error = %e,
                "Unable to render response"
            );
            error_response(&ApiError::from(e))
        }
    }
}

/// Render a single error as a one-element JSON array.
pub fn error_response(err: &ApiError) -> Response {
    let body = serde_json::to_vec(&[err]).unwrap_or_default();
    let mut response = (err.status(), Body::from(body)).into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(JSON_CONTENT_TYPE),
    );
    response
}

fn rendered_response(rendered: RenderedResponse) -> Response {
    let mut response = (rendered.status, Body::from(rendered.body)).into_response();
    response.headers_mut().extend(rendered.headers);
    response
        .headers_mut()
        .entry(header::CONTENT_TYPE)
        .or_insert(HeaderValue::from_static(JSON_CONTENT_TYPE));
    response
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error_response(&self)
    }
}
