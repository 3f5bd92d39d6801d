//! Friend requests and acceptance.
//!
//! Both operations end by pushing a full friend snapshot to both parties.

use tracing::info;

use crate::error::Rejection;
use crate::fanout;
use crate::protocol::MsgKind;
use crate::state::AppState;
use crate::store::FriendStatus;
use crate::types::{FriendAcceptBody, FriendAccepted, FriendRequestBody, IncomingFriendRequest, OpReply};

use super::{outcome, require_user, Actor};

pub async fn request(state: &AppState, actor: Actor<'_>, req: FriendRequestBody) {
    let target = req.to.trim();
    let result = request_checked(state, actor.name, target).await;

    let reply = OpReply::new(outcome(&result)).to(target);
    fanout::reply(actor.out, MsgKind::FriendResponse, &reply).await;
    if result.is_err() {
        return;
    }

    let notice = IncomingFriendRequest {
        incoming: true,
        from: actor.name.to_owned(),
    };
    fanout::push(state, target, MsgKind::FriendResponse, &notice).await;

    fanout::send_friend_snapshot(state, actor.name, actor.out).await;
    fanout::refresh_friend_snapshot(state, target).await;
}

/// Any existing row between the pair blocks a new request, whichever way
/// it points and whatever its status.
pub async fn request_checked(state: &AppState, actor: &str, target: &str) -> Result<String, Rejection> {
    if actor == target {
        return Err(Rejection::SelfFriend);
    }
    require_user(state, target).await?;

    if let Some(edge) = state.store.friendship(actor, target).await? {
        return Err(conflict(edge.status));
    }
    if !state.store.create_friend_request(actor, target).await? {
        // lost a race with a concurrent request for the same pair
        let status = state
            .store
            .friendship(actor, target)
            .await?
            .map_or(FriendStatus::Pending, |edge| edge.status);
        return Err(conflict(status));
    }
    info!(identity = actor, target, "friend request sent");
    Ok("Request sent".into())
}

fn conflict(status: FriendStatus) -> Rejection {
    match status {
        FriendStatus::Accepted => Rejection::AlreadyFriends,
        FriendStatus::Pending => Rejection::FriendRequestPending,
    }
}

pub async fn accept(state: &AppState, actor: Actor<'_>, req: FriendAcceptBody) {
    let requester = req.from.trim();
    let result = accept_checked(state, actor.name, requester).await;

    let reply = OpReply::new(outcome(&result)).accepted(requester);
    fanout::reply(actor.out, MsgKind::FriendResponse, &reply).await;
    if result.is_err() {
        return;
    }

    let notice = FriendAccepted {
        accepted_by: actor.name.to_owned(),
    };
    fanout::push(state, requester, MsgKind::FriendResponse, &notice).await;

    fanout::send_friend_snapshot(state, actor.name, actor.out).await;
    fanout::refresh_friend_snapshot(state, requester).await;
}

/// Only a pending row `requester → actor` can be accepted.
pub async fn accept_checked(state: &AppState, actor: &str, requester: &str) -> Result<String, Rejection> {
    require_user(state, requester).await?;
    if !state.store.accept_friend_request(actor, requester).await? {
        return Err(Rejection::NoPendingFriendRequest);
    }
    info!(identity = actor, requester, "friend request accepted");
    Ok("Accepted".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::Config;
    use crate::delivery::ConsoleDelivery;
    use crate::store::{DirectoryStore, MemoryStore};

    async fn setup() -> (Arc<AppState>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        for u in ["alice", "bob"] {
            store.create_user(&format!("{u}@x.com"), u, "h").await.unwrap();
        }
        let state = AppState::new(Config::default(), store.clone(), Arc::new(ConsoleDelivery));
        (state, store)
    }

    #[tokio::test]
    async fn second_request_conflicts_in_either_direction() {
        let (state, store) = setup().await;
        assert!(matches!(
            request_checked(&state, "alice", "alice").await,
            Err(Rejection::SelfFriend)
        ));
        assert!(matches!(
            request_checked(&state, "alice", "ghost").await,
            Err(Rejection::UserNotFound)
        ));

        request_checked(&state, "alice", "bob").await.unwrap();
        assert!(matches!(
            request_checked(&state, "alice", "bob").await,
            Err(Rejection::FriendRequestPending)
        ));
        assert!(matches!(
            request_checked(&state, "bob", "alice").await,
            Err(Rejection::FriendRequestPending)
        ));

        // only the addressee may accept
        assert!(matches!(
            accept_checked(&state, "alice", "bob").await,
            Err(Rejection::NoPendingFriendRequest)
        ));
        accept_checked(&state, "bob", "alice").await.unwrap();
        assert!(matches!(
            request_checked(&state, "bob", "alice").await,
            Err(Rejection::AlreadyFriends)
        ));
        assert!(matches!(
            accept_checked(&state, "bob", "alice").await,
            Err(Rejection::NoPendingFriendRequest)
        ));

        assert_eq!(store.friends("alice").await.unwrap(), vec!["bob"]);
        assert!(store.pending_friend_requests("bob").await.unwrap().is_empty());
    }
}
