//! Authentication and authorization chains.
//!
//! Each chain is an ordered list of checkers. Checkers are asked in order
//! until one of them decides; a chain nobody decides on allows.

use crate::domain::context::Context;
use crate::domain::error::ApiError;
use crate::push::Session;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

pub const REQUEST_DENIED: &str = "You are not authorized to access this resource";
pub const OPERATION_DENIED: &str = "You are not allowed to access this resource";
pub const SESSION_DENIED: &str = "You are not authorized to start a session";

/// Outcome of one policy check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Deny,
    /// No opinion, ask the next checker
    Continue,
}

/// Authenticates the caller of an operation.
#[async_trait]
pub trait RequestAuthenticator: Send + Sync {
    async fn authenticate_request(&self, ctx: &Context) -> anyhow::Result<Verdict>;
}

/// Decides whether an authenticated caller may run the operation.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn is_authorized(&self, ctx: &Context) -> anyhow::Result<Verdict>;
}

/// Authenticates a WebSocket session before it is upgraded.
#[async_trait]
pub trait SessionAuthenticator: Send + Sync {
    async fn authenticate_session(&self, session: &Session) -> anyhow::Result<Verdict>;
}

/// Evaluate `checkers` in order with `step`.
///
/// Stops at the first error or the first `Allow`/`Deny`. Running off the end
/// of the chain, including an empty chain, yields `Allow`.
pub async fn evaluate_chain<C, F, Fut>(checkers: &[C], mut step: F) -> anyhow::Result<Verdict>
where
    C: Clone,
    F: FnMut(C) -> Fut,
    Fut: Future<Output = anyhow::Result<Verdict>>,
{
    for (index, checker) in checkers.iter().enumerate() {
        match step(checker.clone()).await? {
            Verdict::Continue => continue,
            decided => {
                debug!(index, verdict = ?decided, "auth chain decided");
                return Ok(decided);
            }
        }
    }
    Ok(Verdict::Allow)
}

/// Run the request authenticators for `ctx`.
pub async fn authenticate_request(
    authenticators: &[Arc<dyn RequestAuthenticator>],
    ctx: &Context,
) -> Result<(), ApiError> {
    let verdict = evaluate_chain(authenticators, |a| async move {
        a.authenticate_request(ctx).await
    })
    .await;
    into_result(verdict, ApiError::unauthorized, REQUEST_DENIED)
}

/// Run the authorizers for `ctx`.
pub async fn authorize(authorizers: &[Arc<dyn Authorizer>], ctx: &Context) -> Result<(), ApiError> {
    let verdict = evaluate_chain(authorizers, |a| async move { a.is_authorized(ctx).await }).await;
    into_result(verdict, ApiError::forbidden, OPERATION_DENIED)
}

/// Run the session authenticators for `session`.
pub async fn authenticate_session(
    authenticators: &[Arc<dyn SessionAuthenticator>],
    session: &Session,
) -> Result<(), ApiError> {
    let verdict = evaluate_chain(authenticators, |a| async move {
        a.authenticate_session(session).await
    })
    .await;
    into_result(verdict, ApiError::unauthorized, SESSION_DENIED)
}

fn into_result(
    verdict: anyhow::Result<Verdict>,
    reject: fn(String) -> ApiError,
    denied: &str,
) -> Result<(), ApiError> {
    match verdict {
        Ok(Verdict::Deny) => Err(reject(denied.to_string())),
        Ok(_) => Ok(()),
        Err(e) => Err(reject(e.to_string())),
    }
}
