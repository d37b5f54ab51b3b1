//! HTTP surface.
//!
//! Fixed routes (root, health, meta, the two WebSocket endpoints) are
//! registered explicitly. Every other path goes through the resource
//! fallback, which resolves it to an operation and hands it to the
//! dispatcher.

pub mod response;
pub mod routes;

pub use response::{context_response, error_response};
pub use routes::resolve_route;

use crate::domain::error::ApiError;
use crate::domain::request::RawRequest;
use crate::domain::request_id::RequestId;
use crate::middleware::client_ip;
use crate::push::server::{api_handler, push_handler};
use crate::service::AppState;
use crate::VERSION;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

pub const META_ROUTE: &str = "/_meta/version";
pub const PUSH_ROUTE: &str = "/events";
pub const API_ROUTE: &str = "/wsapi";

/// Body of the meta route.
#[derive(Debug, Serialize)]
struct VersionInfo<'a> {
    service_name: &'a str,
    service_version: &'a str,
    gateway_version: &'static str,
    api_versions: Vec<u32>,
}

/// Routes of the gateway, without middleware.
pub fn router(state: AppState) -> Router {
    let mut router = Router::new().route("/", get(ok).options(ok));

    if state.config.health.enabled {
        router = router.route(&state.config.health.endpoint, get(health).options(ok));
    }
    if !state.config.meta.disable_meta_route {
        router = router.route(META_ROUTE, get(meta_version).options(ok));
    }
    if state.config.websocket.push_enabled {
        router = router.route(PUSH_ROUTE, get(push_handler).options(ok));
    }
    if state.config.websocket.api_enabled {
        router = router.route(API_ROUTE, get(api_handler).options(ok));
    }

    router.fallback(resource).with_state(state)
}

async fn ok() -> StatusCode {
    StatusCode::OK
}

async fn health(State(state): State<AppState>) -> Response {
    let Some(check) = &state.health else {
        return StatusCode::OK.into_response();
    };

    match check.check().await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => {
            warn!(error = %e, "Health check failed");
            error_response(&ApiError::service_unavailable(e.to_string()))
        }
    }
}

async fn meta_version(State(state): State<AppState>) -> Response {
    Json(VersionInfo {
        service_name: &state.config.meta.service_name,
        service_version: &state.config.meta.service_version,
        gateway_version: VERSION,
        api_versions: state.dispatcher.relationships().versions(),
    })
    .into_response()
}

/// Resolve a resource path and dispatch it.
async fn resource(State(state): State<AppState>, request: Request) -> Response {
    if request.method() == Method::OPTIONS {
        return StatusCode::OK.into_response();
    }

    let Some((operation, route)) = resolve_route(request.method(), request.uri().path()) else {
        debug!(method = %request.method(), path = %request.uri().path(), "No route");
        return error_response(&ApiError::not_found());
    };

    let client_ip = client_ip(&request);
    let (parts, body) = request.into_parts();

    let body = match axum::body::to_bytes(body, state.config.http.max_body_size).await {
        Ok(body) => body,
        Err(e) => {
            return error_response(&ApiError::bad_request(format!(
                "Unable to read request body: {e}"
            )))
        }
    };

    let raw = RawRequest {
        request_id: parts
            .extensions
            .get::<RequestId>()
            .copied()
            .unwrap_or_default(),
        route,
        query: parts.uri.query().map(str::to_string),
        url: request_url(&parts.headers, &parts.uri),
        headers: parts.headers,
        body,
        client_ip,
    };

    match state.dispatcher.dispatch(operation, raw).await {
        Ok(ctx) => context_response(&ctx),
        Err(err) => error_response(&err),
    }
}

/// Absolute URL of the request, when the `Host` header allows building one.
fn request_url(headers: &HeaderMap, uri: &Uri) -> Option<Url> {
    let host = headers.get(header::HOST)?.to_str().ok()?;
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");
    let path = uri.path_and_query().map_or("/", |p| p.as_str());
    Url::parse(&format!("{scheme}://{host}{path}")).ok()
}
