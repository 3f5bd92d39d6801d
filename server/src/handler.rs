//! Connection handler, one task per accepted socket.
//!
//! Flow per connection:
//! 1. Split the socket; the write half becomes the connection's [`Outbound`]
//! 2. Read frames until EOF, a decode failure, or the channel is closed
//!    by someone else (failed push, eviction)
//! 3. Dispatch each frame by kind, gated on whether a session is bound
//! 4. On exit: release the registry entry if still ours, shut the writer

use std::net::SocketAddr;
use std::sync::Arc;

use futures::StreamExt;
use tokio::net::TcpStream;
use tokio_util::codec::FramedRead;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::channel::Outbound;
use crate::fanout;
use crate::ops::{auth, friends, groups};
use crate::protocol::{Frame, MsgKind};
use crate::session::Session;
use crate::state::AppState;
use crate::types::{GroupMessageRequest, PrivateMessageRequest, UserList};

pub async fn handle_connection(stream: TcpStream, peer: SocketAddr, conn_id: Uuid, state: Arc<AppState>) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(conn = %conn_id, "set_nodelay failed: {e}");
    }
    let (reader, writer) = stream.into_split();
    let out = Outbound::new(conn_id, writer, state.codec(), state.config.push_timeout);
    let mut frames = FramedRead::new(reader, state.codec());
    let mut session = Session::new(peer, out);

    info!(conn = %conn_id, %peer, "connection opened");

    loop {
        let next = tokio::select! {
            next = frames.next() => next,
            () = session.out().closed() => {
                debug!(conn = %conn_id, "channel closed, ending connection");
                break;
            }
        };

        match next {
            Some(Ok(frame)) => dispatch(&state, &mut session, frame).await,
            Some(Err(e)) => {
                warn!(conn = %conn_id, identity = ?session.identity(), "read failed: {e}");
                break;
            }
            None => break,
        }
    }

    let identity = session.identity().map(str::to_owned);
    session.logout(&state);
    session.out().shutdown().await;
    info!(conn = %conn_id, %peer, identity = ?identity, "connection closed");
}

/// Route one frame. Only the signup steps and login run without a session;
/// anything else from an unauthenticated connection is dropped unanswered.
pub async fn dispatch(state: &AppState, session: &mut Session, frame: Frame) {
    let Some(kind) = frame.msg_kind() else {
        debug!(conn = %session.conn_id(), code = frame.kind, "unknown message kind ignored");
        return;
    };

    if kind.allowed_before_login() {
        match kind {
            MsgKind::LoginRequest => auth::login(state, session, frame.body()).await,
            MsgKind::SignupEmailRequest => {
                auth::signup_start(state, session.out(), frame.body()).await
            }
            MsgKind::VerifyEmailRequest => {
                auth::signup_verify(state, session.out(), frame.body()).await
            }
            MsgKind::SetCredentialsRequest => {
                auth::signup_finalize(state, session.out(), frame.body()).await
            }
            _ => {}
        }
        return;
    }

    let Some(actor) = session.actor() else {
        debug!(conn = %session.conn_id(), ?kind, "dropped: no session");
        return;
    };

    match kind {
        MsgKind::PrivateMessage => {
            let req: PrivateMessageRequest = frame.body();
            let to = req.to.trim();
            if to.is_empty() {
                return;
            }
            fanout::deliver_private(state, actor.name, to, &req.text).await;
        }
        MsgKind::GroupMessage => {
            let req: GroupMessageRequest = frame.body();
            let group = req.group.trim();
            if group.is_empty() {
                return;
            }
            fanout::deliver_group(state, group, actor.name, &req.text).await;
        }
        MsgKind::CreateGroup => groups::create(state, actor, frame.body()).await,
        MsgKind::GroupAddMember => groups::add_member(state, actor, frame.body()).await,
        MsgKind::GroupRemoveMember => groups::remove_member(state, actor, frame.body()).await,
        MsgKind::RequestAddMember => groups::request_add_member(state, actor, frame.body()).await,
        MsgKind::GetMemberRequests => groups::get_member_requests(state, actor, frame.body()).await,
        MsgKind::ApproveMemberRequest => groups::approve(state, actor, frame.body()).await,
        MsgKind::RejectMemberRequest => groups::reject(state, actor, frame.body()).await,
        MsgKind::FriendRequest => friends::request(state, actor, frame.body()).await,
        MsgKind::FriendAccept => friends::accept(state, actor, frame.body()).await,
        MsgKind::ServerInfo => fanout::send_server_info(state, actor.name, actor.out).await,
        MsgKind::ListUsersRequest => match state.store.list_usernames().await {
            Ok(users) => {
                fanout::reply(actor.out, MsgKind::ListUsersResponse, &UserList { users }).await;
            }
            Err(e) => warn!(identity = actor.name, "user list unavailable: {e}"),
        },
        // server-to-client kinds
        _ => debug!(identity = actor.name, ?kind, "unexpected kind from client ignored"),
    }
}
