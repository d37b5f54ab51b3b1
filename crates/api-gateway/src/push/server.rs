//! WebSocket servers.
//!
//! `/events` streams change events to push sessions. `/wsapi` accepts
//! operation requests as JSON frames and answers each with a [`WsResponse`].
//! Both authenticate the session before the connection is upgraded.

use crate::dispatch::Dispatcher;
use crate::domain::error::ApiError;
use crate::domain::request::{RawRequest, RoutePath};
use crate::domain::request_id::RequestId;
use crate::middleware::client_ip_from;
use crate::push::session::{Session, SessionKind};
use crate::rest::error_response;
use crate::service::AppState;
use axum::{
    body::Bytes,
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, RawQuery, State,
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_bus::{Publication, Subscription};
use shared_types::Operation;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// An operation request received on `/wsapi`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WsRequest {
    /// Echoed back in the response; generated when absent
    pub request_id: Option<String>,
    /// Wire name of the operation, e.g. `retrieve-many`
    pub operation: String,
    pub version: Option<u32>,
    pub category: String,
    pub id: Option<String>,
    pub parent_category: Option<String>,
    pub parent_id: Option<String>,
    pub parameters: BTreeMap<String, String>,
    pub data: Option<Value>,
}

/// Answer to a [`WsRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WsResponse {
    pub request_id: String,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub data: Value,
}

impl WsResponse {
    fn error(request_id: String, err: &ApiError) -> Self {
        Self {
            request_id,
            status: err.code,
            headers: BTreeMap::new(),
            data: serde_json::to_value([err]).unwrap_or(Value::Null),
        }
    }
}

fn build_session(
    kind: SessionKind,
    headers: HeaderMap,
    query: Option<String>,
    connect: Option<ConnectInfo<SocketAddr>>,
) -> Session {
    let client_ip = client_ip_from(&headers, connect.map(|c| c.0));
    let parameters = query
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .into_owned()
                .collect()
        })
        .unwrap_or_default();

    Session::new(kind)
        .with_headers(headers)
        .with_parameters(parameters)
        .with_client_ip(client_ip)
}

/// `GET /events`
pub async fn push_handler(
    State(state): State<AppState>,
    connect: Option<ConnectInfo<SocketAddr>>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let session = Arc::new(build_session(SessionKind::Push, headers, query, connect));

    if let Err(err) = state.sessions.authenticate_session(&session).await {
        return error_response(&err);
    }
    if let Err(err) = state.sessions.init_push_session(&session).await {
        session.close();
        return error_response(&err);
    }

    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => {
            session.close();
            return rejection.into_response();
        }
    };

    upgrade
        .max_message_size(state.config.websocket.max_message_size)
        .on_upgrade(move |socket| run_push_session(state, session, socket))
}

async fn next_publication(subscription: &mut Option<Subscription>) -> Option<Publication> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}

async fn run_push_session(state: AppState, session: Arc<Session>, mut socket: WebSocket) {
    let sessions = Arc::clone(&state.sessions);
    if let Err(e) = sessions.register_session(Arc::clone(&session)) {
        warn!(session_id = %session.id(), error = %e, "Unable to register push session");
        return;
    }

    let mut subscription = sessions.subscribe();
    info!(session_id = %session.id(), "Push session connected");

    // Pings are answered by the socket itself.
    loop {
        tokio::select! {
            publication = next_publication(&mut subscription) => {
                let Some(publication) = publication else {
                    debug!(session_id = %session.id(), "Push transport closed");
                    break;
                };
                let Some(text) = sessions.deliverable(&session, &publication).await else {
                    continue;
                };
                if let Err(e) = socket.send(Message::Text(text)).await {
                    debug!(session_id = %session.id(), error = %e, "Push send failed");
                    break;
                }
                state.metrics.record_ws_message();
            }
            message = socket.next() => match message {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(session_id = %session.id(), error = %e, "Push socket error");
                    break;
                }
            },
        }
    }

    session.begin_close();
    drop(subscription);
    sessions.unregister_session(&session);
    info!(session_id = %session.id(), "Push session disconnected");
}

/// `GET /wsapi`
pub async fn api_handler(
    State(state): State<AppState>,
    connect: Option<ConnectInfo<SocketAddr>>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let session = Arc::new(build_session(SessionKind::Api, headers, query, connect));

    if let Err(err) = state.sessions.authenticate_session(&session).await {
        return error_response(&err);
    }

    match upgrade {
        Ok(upgrade) => upgrade.on_upgrade(move |socket| run_api_session(state, session, socket)),
        Err(rejection) => {
            session.close();
            rejection.into_response()
        }
    }
}

async fn run_api_session(state: AppState, session: Arc<Session>, mut socket: WebSocket) {
    let sessions = Arc::clone(&state.sessions);
    if let Err(e) = sessions.register_session(Arc::clone(&session)) {
        warn!(session_id = %session.id(), error = %e, "Unable to register api session");
        return;
    }
    info!(session_id = %session.id(), "API session connected");

    let max_message_size = state.config.websocket.max_message_size;

    while let Some(message) = socket.next().await {
        let frame = match message {
            Ok(Message::Text(text)) => Bytes::from(text),
            Ok(Message::Binary(data)) => Bytes::from(data),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!(session_id = %session.id(), error = %e, "API socket error");
                break;
            }
        };

        let response = handle_api_frame(&state.dispatcher, &session, max_message_size, &frame).await;
        let text = match serde_json::to_string(&response) {
            Ok(text) => text,
            Err(e) => {
                warn!(session_id = %session.id(), error = %e, "Unable to encode response");
                continue;
            }
        };

        if let Err(e) = socket.send(Message::Text(text)).await {
            debug!(session_id = %session.id(), error = %e, "API send failed");
            break;
        }
        state.metrics.record_ws_message();
    }

    session.begin_close();
    sessions.unregister_session(&session);
    info!(session_id = %session.id(), "API session disconnected");
}

/// Decode one `/wsapi` frame, dispatch it, and build the answer.
pub async fn handle_api_frame(
    dispatcher: &Dispatcher,
    session: &Session,
    max_message_size: usize,
    frame: &[u8],
) -> WsResponse {
    if frame.len() > max_message_size {
        return WsResponse::error(
            RequestId::new().to_string(),
            &ApiError::bad_request(format!(
                "Message too large: {} bytes (max: {max_message_size})",
                frame.len()
            )),
        );
    }

    let request: WsRequest = match serde_json::from_slice(frame) {
        Ok(request) => request,
        Err(e) => {
            return WsResponse::error(
                RequestId::new().to_string(),
                &ApiError::bad_request(format!("Invalid message: {e}")),
            )
        }
    };

    let request_id = request
        .request_id
        .as_deref()
        .map_or_else(RequestId::new, |id| RequestId::from_header(Some(id)));
    let echo = request
        .request_id
        .clone()
        .unwrap_or_else(|| request_id.to_string());

    let operation: Operation = match request.operation.parse() {
        Ok(operation) => operation,
        Err(e) => return WsResponse::error(echo, &ApiError::bad_request(format!("{e}"))),
    };

    let body = match &request.data {
        Some(data) => match serde_json::to_vec(data) {
            Ok(body) => Bytes::from(body),
            Err(e) => return WsResponse::error(echo, &ApiError::bad_request(e.to_string())),
        },
        None => Bytes::new(),
    };

    let query = (!request.parameters.is_empty()).then(|| {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(&request.parameters)
            .finish()
    });

    let raw = RawRequest {
        request_id,
        route: RoutePath {
            version: request.version.map(|v| v.to_string()),
            category: request.category,
            id: request.id,
            parent_category: request.parent_category,
            parent_id: request.parent_id,
        },
        query,
        headers: session.headers().clone(),
        body,
        url: None,
        client_ip: session.client_ip(),
    };

    let ctx = match dispatcher.dispatch(operation, raw).await {
        Ok(ctx) => ctx,
        Err(err) => return WsResponse::error(echo, &err),
    };

    let rendered = match ctx.serialize() {
        Ok(rendered) => rendered,
        Err(e) => return WsResponse::error(echo, &ApiError::from(e)),
    };

    let headers = rendered
        .headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    let data = if rendered.body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&rendered.body).unwrap_or(Value::Null)
    };

    WsResponse {
        request_id: echo,
        status: rendered.status.as_u16(),
        headers,
        data,
    }
}
