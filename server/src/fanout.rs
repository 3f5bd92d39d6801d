//! Routing and fan-out.
//!
//! Decides which live channels receive an event and writes to them. After
//! any state change the affected identities get a complete snapshot
//! (server info or friend list) instead of a delta, so clients never have
//! to reconcile partial updates.
//!
//! A push that fails or times out drops the recipient's session and closes
//! its connection; the sender is never affected. Chat messages that would
//! not fit in one outbound frame are dropped before they are stored or
//! routed, so a sender cannot make a push fail on someone else's channel.

use serde::Serialize;
use tracing::{debug, error, warn};

use crate::channel::Outbound;
use crate::error::StoreError;
use crate::protocol::{Frame, MsgKind};
use crate::state::AppState;
use crate::types::{ChatDelivery, FriendSnapshot, ServerInfo};

fn encode<T: Serialize>(kind: MsgKind, body: &T) -> Option<Frame> {
    match Frame::from_body(kind, body) {
        Ok(frame) => Some(frame),
        Err(e) => {
            error!(?kind, "failed to encode outbound payload: {e}");
            None
        }
    }
}

/// Encode a chat delivery, refusing it if the rebuilt payload exceeds the
/// frame limit.
fn routable<T: Serialize>(state: &AppState, kind: MsgKind, body: &T) -> Option<Frame> {
    let frame = encode(kind, body)?;
    let max = state.config.max_frame_len;
    match frame.payload_len() {
        Ok(len) if len <= max => Some(frame),
        Ok(len) => {
            warn!(?kind, len, max, "chat message too large to deliver, dropped");
            None
        }
        Err(e) => {
            error!(?kind, "failed to encode outbound payload: {e}");
            None
        }
    }
}

/// Write to a connection's own channel.
pub async fn reply<T: Serialize>(out: &Outbound, kind: MsgKind, body: &T) -> bool {
    let Some(frame) = encode(kind, body) else {
        return false;
    };
    match out.send(frame).await {
        Ok(()) => true,
        Err(e) => {
            warn!(conn = %out.conn_id(), ?kind, "reply failed: {e}");
            false
        }
    }
}

/// Push to `identity` if it is online. Returns whether a frame was written.
pub async fn push<T: Serialize>(state: &AppState, identity: &str, kind: MsgKind, body: &T) -> bool {
    match encode(kind, body) {
        Some(frame) => push_frame(state, identity, frame).await,
        None => false,
    }
}

pub async fn push_frame(state: &AppState, identity: &str, frame: Frame) -> bool {
    let Some(out) = state.sessions.lookup(identity) else {
        return false;
    };
    match out.send(frame).await {
        Ok(()) => true,
        Err(e) if e.is_transport() => {
            warn!(identity, conn = %out.conn_id(), "push failed, dropping session: {e}");
            state.sessions.unregister(identity, out.conn_id());
            out.close();
            false
        }
        Err(e) => {
            warn!(identity, conn = %out.conn_id(), "push skipped: {e}");
            false
        }
    }
}

// ═══════════════════════════════════════════════════════════════
// Chat delivery
// ═══════════════════════════════════════════════════════════════

/// Persist, then deliver to `to` if online. Offline recipients only get
/// the stored copy. Returns whether a live copy was written.
pub async fn deliver_private(state: &AppState, from: &str, to: &str, text: &str) -> bool {
    let body = ChatDelivery {
        from: from.to_owned(),
        group: None,
        text: text.to_owned(),
    };
    let Some(frame) = routable(state, MsgKind::PrivateMessage, &body) else {
        return false;
    };

    if let Err(e) = state.store.save_private_message(from, to, text).await {
        warn!(from, to, "private message not persisted: {e}");
    }
    push_frame(state, to, frame).await
}

/// Deliver to every online member of `group` except the sender. The sender
/// must be a member right now; otherwise nothing happens. Returns how many
/// members received a copy.
pub async fn deliver_group(state: &AppState, group: &str, from: &str, text: &str) -> usize {
    match state.store.is_member(group, from).await {
        Ok(true) => {}
        Ok(false) => {
            debug!(from, group, "group message from non-member dropped");
            return 0;
        }
        Err(e) => {
            warn!(from, group, "membership check failed, dropping message: {e}");
            return 0;
        }
    }

    let body = ChatDelivery {
        from: from.to_owned(),
        group: Some(group.to_owned()),
        text: text.to_owned(),
    };
    let Some(frame) = routable(state, MsgKind::GroupMessage, &body) else {
        return 0;
    };

    if let Err(e) = state.store.save_group_message(group, from, text).await {
        warn!(from, group, "group message not persisted: {e}");
    }

    let members = match state.store.group_members(group).await {
        Ok(members) => members,
        Err(e) => {
            warn!(group, "member lookup failed, message not delivered: {e}");
            return 0;
        }
    };

    let mut delivered = 0;
    for member in members.iter().filter(|m| m.as_str() != from) {
        if push_frame(state, member, frame.clone()).await {
            delivered += 1;
        }
    }
    debug!(from, group, delivered, "group message fanned out");
    delivered
}

// ═══════════════════════════════════════════════════════════════
// Snapshots
// ═══════════════════════════════════════════════════════════════

pub async fn server_info(state: &AppState, identity: &str) -> Result<ServerInfo, StoreError> {
    let groups = state.store.user_groups(identity).await?;
    let mut info = ServerInfo {
        users: state.sessions.snapshot(),
        ..ServerInfo::default()
    };

    for group in &groups {
        let members = state.store.group_members(group).await?;
        let admin = state.store.group(group).await?.and_then(|g| g.admin);
        info.group_members.insert(group.clone(), members);
        info.group_admins.insert(group.clone(), admin);
    }
    info.groups = groups;
    Ok(info)
}

pub async fn friend_snapshot(state: &AppState, identity: &str) -> Result<FriendSnapshot, StoreError> {
    Ok(FriendSnapshot {
        friends: state.store.friends(identity).await?,
        pending: state.store.pending_friend_requests(identity).await?,
    })
}

/// Server info for `identity`, written to a specific channel.
pub async fn send_server_info(state: &AppState, identity: &str, out: &Outbound) {
    match server_info(state, identity).await {
        Ok(info) => {
            reply(out, MsgKind::ServerInfo, &info).await;
        }
        Err(e) => warn!(identity, "server info unavailable: {e}"),
    }
}

/// Server info for `identity`, pushed to its live channel if online.
pub async fn refresh_server_info(state: &AppState, identity: &str) {
    if !state.sessions.is_online(identity) {
        return;
    }
    match server_info(state, identity).await {
        Ok(info) => {
            push(state, identity, MsgKind::ServerInfo, &info).await;
        }
        Err(e) => warn!(identity, "server info unavailable: {e}"),
    }
}

pub async fn send_friend_snapshot(state: &AppState, identity: &str, out: &Outbound) {
    match friend_snapshot(state, identity).await {
        Ok(snapshot) => {
            reply(out, MsgKind::FriendList, &snapshot).await;
        }
        Err(e) => warn!(identity, "friend snapshot unavailable: {e}"),
    }
}

pub async fn refresh_friend_snapshot(state: &AppState, identity: &str) {
    if !state.sessions.is_online(identity) {
        return;
    }
    match friend_snapshot(state, identity).await {
        Ok(snapshot) => {
            push(state, identity, MsgKind::FriendList, &snapshot).await;
        }
        Err(e) => warn!(identity, "friend snapshot unavailable: {e}"),
    }
}
