//! Push sessions: the session state machine, the session registry and the
//! WebSocket servers built on them.

pub mod manager;
pub mod server;
pub mod session;

pub use manager::{SessionManager, EMPTY_IDENTIFIER, EMPTY_UNREGISTER_IDENTIFIER, PUSH_INIT_DENIED};
pub use server::{handle_api_frame, WsRequest, WsResponse};
pub use session::{Session, SessionError, SessionKind, SessionState};
