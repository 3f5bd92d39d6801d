//! Group lifecycle: create, admin add/remove, and the membership-request
//! flow (a member proposes a friend, the admin approves or rejects).
//!
//! Every reply echoes `group` and `user`. Successful mutations re-sync the
//! server info of the actor and, where a second identity is affected, of
//! that identity too.

use tracing::info;

use crate::error::{AdminAction, Rejection};
use crate::fanout;
use crate::protocol::MsgKind;
use crate::state::AppState;
use crate::store::GroupRecord;
use crate::types::{
    GroupMemberRequest, GroupRequest, MemberRequestList, MemberRequestNotice, MemberRequestView,
    OpReply,
};

use super::{are_friends, outcome, require_user, Actor};

async fn require_group(state: &AppState, name: &str) -> Result<GroupRecord, Rejection> {
    if name.is_empty() {
        return Err(Rejection::MissingField("Group name"));
    }
    state
        .store
        .group(name)
        .await?
        .ok_or(Rejection::GroupNotFound)
}

/// The group, provided `actor` is its admin.
async fn require_admin(
    state: &AppState,
    name: &str,
    actor: &str,
    action: AdminAction,
) -> Result<GroupRecord, Rejection> {
    let group = require_group(state, name).await?;
    if group.admin.as_deref() != Some(actor) {
        return Err(Rejection::NotGroupAdmin(action));
    }
    Ok(group)
}

// ═══════════════════════════════════════════════════════════════
// Create
// ═══════════════════════════════════════════════════════════════

pub async fn create(state: &AppState, actor: Actor<'_>, req: GroupRequest) {
    let name = req.group.trim();
    let result = create_checked(state, actor.name, name).await;

    let reply = OpReply::new(outcome(&result)).group(name);
    fanout::reply(actor.out, MsgKind::CreateGroupResponse, &reply).await;

    if result.is_ok() {
        fanout::send_server_info(state, actor.name, actor.out).await;
    }
}

pub async fn create_checked(state: &AppState, actor: &str, name: &str) -> Result<String, Rejection> {
    if name.is_empty() {
        return Err(Rejection::MissingField("Group name"));
    }
    if !state.store.create_group(name, actor).await? {
        return Err(Rejection::GroupNameTaken);
    }
    info!(identity = actor, group = name, "group created");
    Ok("Group created".into())
}

// ═══════════════════════════════════════════════════════════════
// Admin add / remove
// ═══════════════════════════════════════════════════════════════

pub async fn add_member(state: &AppState, actor: Actor<'_>, req: GroupMemberRequest) {
    let (group, target) = (req.group.trim(), req.user.trim());
    let result = add_member_checked(state, actor.name, group, target).await;
    respond(state, actor, MsgKind::GroupAddMemberResponse, group, target, &result).await;
}

pub async fn add_member_checked(
    state: &AppState,
    actor: &str,
    group: &str,
    target: &str,
) -> Result<String, Rejection> {
    require_admin(state, group, actor, AdminAction::AddMembers).await?;
    require_user(state, target).await?;
    if !are_friends(state, actor, target).await? {
        return Err(Rejection::NotAdminsFriend);
    }
    if !state.store.add_member(group, target).await? {
        return Err(Rejection::AlreadyMember);
    }
    info!(identity = actor, group, target, "member added");
    Ok("User added to group".into())
}

pub async fn remove_member(state: &AppState, actor: Actor<'_>, req: GroupMemberRequest) {
    let (group, target) = (req.group.trim(), req.user.trim());
    let result = remove_member_checked(state, actor.name, group, target).await;
    respond(state, actor, MsgKind::GroupRemoveMemberResponse, group, target, &result).await;
}

pub async fn remove_member_checked(
    state: &AppState,
    actor: &str,
    group: &str,
    target: &str,
) -> Result<String, Rejection> {
    require_admin(state, group, actor, AdminAction::RemoveMembers).await?;
    if actor == target {
        return Err(Rejection::AdminSelfRemoval);
    }
    require_user(state, target).await?;
    if !state.store.remove_member(group, target).await? {
        return Err(Rejection::NotInGroup);
    }
    info!(identity = actor, group, target, "member removed");
    Ok("User removed from group".into())
}

// ═══════════════════════════════════════════════════════════════
// Membership requests
// ═══════════════════════════════════════════════════════════════

/// A member asks the admin to add one of their friends. The admin, if
/// online, gets an unsolicited notice on the same response kind.
pub async fn request_add_member(state: &AppState, actor: Actor<'_>, req: GroupMemberRequest) {
    let (group, target) = (req.group.trim(), req.user.trim());
    let result = request_add_member_checked(state, actor.name, group, target).await;

    let reply = OpReply::new(outcome(&result)).group(group).user(target);
    fanout::reply(actor.out, MsgKind::RequestAddMemberResponse, &reply).await;

    let Ok(_) = result else { return };
    let admin = match state.store.group(group).await {
        Ok(Some(GroupRecord { admin: Some(admin), .. })) => admin,
        _ => return,
    };
    let notice = MemberRequestNotice {
        ok: true,
        message: format!("{} requested to add {target} to {group}", actor.name),
        group: group.to_owned(),
        requester: actor.name.to_owned(),
        user: target.to_owned(),
    };
    fanout::push(state, &admin, MsgKind::RequestAddMemberResponse, &notice).await;
}

pub async fn request_add_member_checked(
    state: &AppState,
    actor: &str,
    group: &str,
    target: &str,
) -> Result<String, Rejection> {
    require_group(state, group).await?;
    require_user(state, target).await?;
    if !state.store.is_member(group, actor).await? {
        return Err(Rejection::NotGroupMember);
    }
    if state.store.is_member(group, target).await? {
        return Err(Rejection::AlreadyMember);
    }
    if !are_friends(state, actor, target).await? {
        return Err(Rejection::NotRequestersFriend);
    }
    if !state.store.create_member_request(group, actor, target).await? {
        return Err(Rejection::MemberRequestExists);
    }
    info!(identity = actor, group, target, "membership requested");
    Ok("Request sent to admin for approval".into())
}

/// Pending requests for a group. Non-admins get `ok: false` and no rows.
pub async fn get_member_requests(state: &AppState, actor: Actor<'_>, req: GroupRequest) {
    let group = req.group.trim();
    let list = match pending_requests_checked(state, actor.name, group).await {
        Ok(requests) => MemberRequestList {
            ok: true,
            message: None,
            group: group.to_owned(),
            requests,
        },
        Err(rejection) => MemberRequestList {
            ok: false,
            message: Some(rejection.to_string()),
            group: group.to_owned(),
            requests: Vec::new(),
        },
    };
    fanout::reply(actor.out, MsgKind::GetMemberRequestsResponse, &list).await;
}

pub async fn pending_requests_checked(
    state: &AppState,
    actor: &str,
    group: &str,
) -> Result<Vec<MemberRequestView>, Rejection> {
    require_admin(state, group, actor, AdminAction::ViewRequests).await?;
    let rows = state.store.pending_member_requests(group).await?;
    Ok(rows
        .into_iter()
        .map(|r| MemberRequestView {
            id: r.id,
            requester: r.requester,
            target: r.target,
            status: r.status.as_str().to_owned(),
        })
        .collect())
}

pub async fn approve(state: &AppState, actor: Actor<'_>, req: GroupMemberRequest) {
    let (group, target) = (req.group.trim(), req.user.trim());
    let result = approve_checked(state, actor.name, group, target).await;
    respond(state, actor, MsgKind::ApproveMemberResponse, group, target, &result).await;
}

pub async fn approve_checked(
    state: &AppState,
    actor: &str,
    group: &str,
    target: &str,
) -> Result<String, Rejection> {
    require_admin(state, group, actor, AdminAction::ApproveRequests).await?;
    require_user(state, target).await?;

    let pending = state.store.pending_member_requests(group).await?;
    if !pending.iter().any(|r| r.target == target) {
        return Err(Rejection::NoPendingMemberRequest);
    }
    if state.store.is_member(group, target).await? {
        return Err(Rejection::AlreadyMember);
    }
    if !state.store.approve_member_request(group, target).await? {
        return Err(Rejection::NoPendingMemberRequest);
    }
    info!(identity = actor, group, target, "membership request approved");
    Ok(format!("{target} added to group"))
}

/// Rejection changes nobody's membership, so nothing is re-synced.
pub async fn reject(state: &AppState, actor: Actor<'_>, req: GroupMemberRequest) {
    let (group, target) = (req.group.trim(), req.user.trim());
    let result = reject_checked(state, actor.name, group, target).await;
    let reply = OpReply::new(outcome(&result)).group(group).user(target);
    fanout::reply(actor.out, MsgKind::RejectMemberResponse, &reply).await;
}

pub async fn reject_checked(
    state: &AppState,
    actor: &str,
    group: &str,
    target: &str,
) -> Result<String, Rejection> {
    require_admin(state, group, actor, AdminAction::RejectRequests).await?;
    require_user(state, target).await?;
    if !state.store.reject_member_request(group, target).await? {
        return Err(Rejection::NoPendingMemberRequest);
    }
    info!(identity = actor, group, target, "membership request rejected");
    Ok("Request rejected".into())
}

/// Reply to the actor, then on success re-sync the actor and the target.
async fn respond(
    state: &AppState,
    actor: Actor<'_>,
    kind: MsgKind,
    group: &str,
    target: &str,
    result: &Result<String, Rejection>,
) {
    let reply = OpReply::new(outcome(result)).group(group).user(target);
    fanout::reply(actor.out, kind, &reply).await;

    if result.is_ok() {
        fanout::send_server_info(state, actor.name, actor.out).await;
        if target != actor.name {
            fanout::refresh_server_info(state, target).await;
        }
    }
}
