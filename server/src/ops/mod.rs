//! Operations invoked by the connection handler's dispatch table.
//!
//! Each operation validates its request, mutates or queries the directory
//! store, answers on the caller's own channel with `(ok, reason)`, and on
//! success asks the fan-out layer to re-sync everyone affected. Failures are
//! always answered, never propagated.

pub mod auth;
pub mod friends;
pub mod groups;

use crate::channel::Outbound;
use crate::error::Rejection;
use crate::state::AppState;
use crate::store::FriendStatus;

/// An authenticated caller and the channel its replies go to.
#[derive(Debug, Clone, Copy)]
pub struct Actor<'a> {
    pub name: &'a str,
    pub out: &'a Outbound,
}

/// `Ok` message / `Err` reason pair as sent to clients.
pub(crate) fn outcome(result: &Result<String, Rejection>) -> Result<String, String> {
    match result {
        Ok(message) => Ok(message.clone()),
        Err(rejection) => Err(rejection.to_string()),
    }
}

pub(crate) async fn are_friends(state: &AppState, a: &str, b: &str) -> Result<bool, Rejection> {
    Ok(matches!(
        state.store.friendship(a, b).await?,
        Some(edge) if edge.status == FriendStatus::Accepted
    ))
}

pub(crate) async fn require_user(state: &AppState, username: &str) -> Result<(), Rejection> {
    if username.is_empty() {
        return Err(Rejection::MissingField("Username"));
    }
    match state.store.user_by_username(username).await? {
        Some(_) => Ok(()),
        None => Err(Rejection::UserNotFound),
    }
}
