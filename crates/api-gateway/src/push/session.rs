//! WebSocket sessions.

use crate::domain::request_id::RequestId;
use axum::http::HeaderMap;
use parking_lot::Mutex;
use std::fmt;
use std::net::IpAddr;
use thiserror::Error;

/// What a session is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    /// Receives pushed events
    Push,
    /// Sends operations over the socket
    Api,
}

/// Lifecycle of a session.
///
/// ```text
/// Connecting -> Authenticating -> Active -> Closing -> Closed
/// Authenticating -> Closed
/// ```
///
/// Any state but `Closed` may also go straight to `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Authenticating,
    Active,
    Closing,
    Closed,
}

impl SessionState {
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Connecting, Authenticating)
                | (Authenticating, Active)
                | (Active, Closing)
                | (Connecting | Authenticating | Active | Closing, Closed)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Active => "active",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("invalid session transition from {from} to {to}")]
    InvalidTransition {
        from: SessionState,
        to: SessionState,
    },

    #[error("session is closed")]
    Closed,
}

/// One WebSocket connection.
pub struct Session {
    id: String,
    kind: SessionKind,
    headers: HeaderMap,
    parameters: Vec<(String, String)>,
    client_ip: Option<IpAddr>,
    state: Mutex<SessionState>,
}

impl Session {
    /// A session with a fresh identifier, in `Connecting`.
    pub fn new(kind: SessionKind) -> Self {
        Self::with_id(RequestId::new().to_string(), kind)
    }

    pub fn with_id(id: impl Into<String>, kind: SessionKind) -> Self {
        Self {
            id: id.into(),
            kind,
            headers: HeaderMap::new(),
            parameters: Vec::new(),
            client_ip: None,
            state: Mutex::new(SessionState::Connecting),
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_parameters(mut self, parameters: Vec<(String, String)>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_client_ip(mut self, ip: Option<IpAddr>) -> Self {
        self.client_ip = ip;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// First value of a connection query parameter.
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn client_ip(&self) -> Option<IpAddr> {
        self.client_ip
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Move to `next` if the lifecycle allows it.
    pub fn transition(&self, next: SessionState) -> Result<(), SessionError> {
        let mut state = self.state.lock();
        if *state == SessionState::Closed {
            return Err(SessionError::Closed);
        }
        if !state.can_transition_to(next) {
            return Err(SessionError::InvalidTransition {
                from: *state,
                to: next,
            });
        }
        *state = next;
        Ok(())
    }

    /// Move an active session to `Closing` once its connection is going
    /// away. False in any other state.
    pub fn begin_close(&self) -> bool {
        let mut state = self.state.lock();
        if *state != SessionState::Active {
            return false;
        }
        *state = SessionState::Closing;
        true
    }

    /// Close from whatever state the session is in. Returns false if it
    /// already was closed.
    pub fn close(&self) -> bool {
        let mut state = self.state.lock();
        if *state == SessionState::Closed {
            return false;
        }
        *state = SessionState::Closed;
        true
    }

    pub fn is_closed(&self) -> bool {
        self.state() == SessionState::Closed
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("state", &self.state())
            .field("client_ip", &self.client_ip)
            .finish()
    }
}
