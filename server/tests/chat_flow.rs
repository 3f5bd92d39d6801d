//! End-to-end flows over real TCP connections against the memory store.

mod common;

use serde_json::json;

use chatd::protocol::{Frame, MsgKind};
use chatd::store::DirectoryStore;

use common::TestServer;

#[tokio::test]
async fn signup_verify_finalize_then_login() {
    let server = TestServer::start().await;
    let mut client = server.connect().await;

    client
        .send(MsgKind::SignupEmailRequest, json!({"email": "a@x.com"}))
        .await;
    let resp = client.expect(MsgKind::SignupEmailResponse).await;
    assert_eq!(resp, json!({"ok": true, "message": "Verification code sent"}));
    let code = server.delivery.code_for("a@x.com").expect("code delivered");
    assert_eq!(code.len(), 6);

    client
        .send(MsgKind::VerifyEmailRequest, json!({"email": "a@x.com", "code": "not-it"}))
        .await;
    let resp = client.expect(MsgKind::VerifyEmailResponse).await;
    assert_eq!(resp, json!({"ok": false, "error": "Incorrect code"}));

    client
        .send(MsgKind::VerifyEmailRequest, json!({"email": "a@x.com", "code": code}))
        .await;
    let resp = client.expect(MsgKind::VerifyEmailResponse).await;
    assert_eq!(resp["ok"], true);

    client
        .send(
            MsgKind::SetCredentialsRequest,
            json!({"email": "a@x.com", "username": "alice", "password": "pw1"}),
        )
        .await;
    let resp = client.expect(MsgKind::SetCredentialsResponse).await;
    assert_eq!(resp, json!({"ok": true, "message": "Account created"}));

    let _alice = server.login("alice", "pw1").await;

    let mut other = server.connect().await;
    other
        .send(MsgKind::LoginRequest, json!({"username": "alice", "password": "wrong"}))
        .await;
    let resp = other.expect(MsgKind::LoginResponse).await;
    assert_eq!(resp, json!({"ok": false, "error": "Invalid password"}));
    other.expect_silence().await;
}

#[tokio::test]
async fn login_pushes_ack_friends_and_server_info_in_order() {
    let server = TestServer::start().await;
    server.seed_user("alice", "pw").await;
    server.seed_user("bob", "pw").await;
    server.befriend("alice", "bob").await;
    server.store.create_group("team", "alice").await.unwrap();

    let mut client = server.connect().await;
    client
        .send(MsgKind::LoginRequest, json!({"username": "alice", "password": "pw"}))
        .await;

    let ack = client.expect(MsgKind::LoginResponse).await;
    assert_eq!(ack, json!({"ok": true, "username": "alice", "groups": ["team"]}));
    let friends = client.expect(MsgKind::FriendList).await;
    assert_eq!(friends, json!({"friends": ["bob"], "pending": []}));
    let info = client.expect(MsgKind::ServerInfo).await;
    assert_eq!(info["users"], json!(["alice"]));
    assert_eq!(info["group_members"]["team"], json!(["alice"]));
    assert_eq!(info["group_admins"]["team"], "alice");
}

#[tokio::test]
async fn admin_creates_group_adds_friend_and_cannot_remove_self() {
    let server = TestServer::start().await;
    server.seed_user("alice", "pw").await;
    server.seed_user("bob", "pw").await;
    server.befriend("alice", "bob").await;
    let mut alice = server.login("alice", "pw").await;
    let mut bob = server.login("bob", "pw").await;

    alice.send(MsgKind::CreateGroup, json!({"group": "team"})).await;
    let resp = alice.expect(MsgKind::CreateGroupResponse).await;
    assert_eq!(resp, json!({"ok": true, "message": "Group created", "group": "team"}));
    let info = alice.expect(MsgKind::ServerInfo).await;
    assert_eq!(info["groups"], json!(["team"]));

    alice
        .send(MsgKind::GroupAddMember, json!({"group": "team", "user": "bob"}))
        .await;
    let resp = alice.expect(MsgKind::GroupAddMemberResponse).await;
    assert_eq!(
        resp,
        json!({"ok": true, "message": "User added to group", "group": "team", "user": "bob"})
    );
    let info = alice.expect(MsgKind::ServerInfo).await;
    assert_eq!(info["group_members"]["team"], json!(["alice", "bob"]));
    let info = bob.expect(MsgKind::ServerInfo).await;
    assert_eq!(info["groups"], json!(["team"]));

    alice
        .send(MsgKind::GroupRemoveMember, json!({"group": "team", "user": "alice"}))
        .await;
    let resp = alice.expect(MsgKind::GroupRemoveMemberResponse).await;
    assert_eq!(resp["ok"], false);
    assert_eq!(resp["message"], "Admin cannot remove themselves");
    alice.expect_silence().await;
    assert!(server.store.is_member("team", "alice").await.unwrap());

    // bob is a member but not the admin
    bob.send(MsgKind::GroupAddMember, json!({"group": "team", "user": "alice"}))
        .await;
    let resp = bob.expect(MsgKind::GroupAddMemberResponse).await;
    assert_eq!(resp["message"], "Only group admin can add members");
}

#[tokio::test]
async fn group_message_reaches_every_other_online_member_once() {
    let server = TestServer::start().await;
    for u in ["alice", "bob", "carol", "dave"] {
        server.seed_user(u, "pw").await;
    }
    server.store.create_group("team", "alice").await.unwrap();
    server.store.add_member("team", "bob").await.unwrap();
    server.store.add_member("team", "carol").await.unwrap();

    let mut alice = server.login("alice", "pw").await;
    let mut bob = server.login("bob", "pw").await;
    let mut carol = server.login("carol", "pw").await;
    let mut dave = server.login("dave", "pw").await;

    alice
        .send(MsgKind::GroupMessage, json!({"group": "team", "text": "hi all"}))
        .await;
    for member in [&mut bob, &mut carol] {
        let msg = member.expect(MsgKind::GroupMessage).await;
        assert_eq!(msg, json!({"from": "alice", "group": "team", "text": "hi all"}));
        member.expect_silence().await;
    }
    alice.expect_silence().await;
    dave.expect_silence().await;

    // a non-member cannot post into the group
    dave.send(MsgKind::GroupMessage, json!({"group": "team", "text": "let me in"}))
        .await;
    alice.expect_silence().await;
    bob.expect_silence().await;
    assert_eq!(server.store.message_log().await.len(), 1);
}

#[tokio::test]
async fn private_message_delivered_live_and_stored_when_offline() {
    let server = TestServer::start().await;
    server.seed_user("alice", "pw").await;
    server.seed_user("bob", "pw").await;
    let mut alice = server.login("alice", "pw").await;

    alice
        .send(MsgKind::PrivateMessage, json!({"to": "bob", "text": "are you there"}))
        .await;
    alice.expect_silence().await;

    let mut bob = server.login("bob", "pw").await;
    alice
        .send(MsgKind::PrivateMessage, json!({"to": "bob", "text": "hello"}))
        .await;
    let frame = bob.recv().await;
    assert_eq!(frame.msg_kind(), Some(MsgKind::PrivateMessage));
    assert_eq!(frame.priority, 2);
    assert_eq!(frame.payload["from"], "alice");
    assert_eq!(frame.payload["text"], "hello");

    let log = server.store.message_log().await;
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].to.as_deref(), Some("bob"));
}

#[tokio::test]
async fn second_login_takes_over_without_closing_the_first() {
    let server = TestServer::start().await;
    server.seed_user("alice", "pw").await;
    server.seed_user("bob", "pw").await;
    let mut first = server.login("alice", "pw").await;
    let mut second = server.login("alice", "pw").await;
    let mut bob = server.login("bob", "pw").await;

    bob.send(MsgKind::PrivateMessage, json!({"to": "alice", "text": "which one?"}))
        .await;
    let msg = second.expect(MsgKind::PrivateMessage).await;
    assert_eq!(msg["text"], "which one?");
    first.expect_silence().await;

    // the first connection is still open and still answers
    first.send(MsgKind::ServerInfo, json!({})).await;
    first.expect(MsgKind::ServerInfo).await;

    // and its disconnect does not evict the newer session
    drop(first);
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert!(server.state.sessions.is_online("alice"));

    drop(second);
    server.wait_online("alice", false).await;
}

#[tokio::test]
async fn friend_request_conflicts_and_acceptance() {
    let server = TestServer::start().await;
    server.seed_user("alice", "pw").await;
    server.seed_user("bob", "pw").await;
    let mut alice = server.login("alice", "pw").await;
    let mut bob = server.login("bob", "pw").await;

    alice.send(MsgKind::FriendRequest, json!({"to": "bob"})).await;
    let resp = alice.expect(MsgKind::FriendResponse).await;
    assert_eq!(resp, json!({"ok": true, "message": "Request sent", "to": "bob"}));
    let snapshot = alice.expect(MsgKind::FriendList).await;
    assert_eq!(snapshot, json!({"friends": [], "pending": []}));

    let notice = bob.expect(MsgKind::FriendResponse).await;
    assert_eq!(notice, json!({"incoming": true, "from": "alice"}));
    let snapshot = bob.expect(MsgKind::FriendList).await;
    assert_eq!(snapshot, json!({"friends": [], "pending": ["alice"]}));

    // reverse direction is blocked while the first request is pending
    bob.send(MsgKind::FriendRequest, json!({"to": "alice"})).await;
    let resp = bob.expect(MsgKind::FriendResponse).await;
    assert_eq!(resp["ok"], false);
    assert_eq!(resp["message"], "Request already pending");
    bob.expect_silence().await;

    bob.send(MsgKind::FriendAccept, json!({"from": "alice"})).await;
    let resp = bob.expect(MsgKind::FriendResponse).await;
    assert_eq!(resp, json!({"ok": true, "message": "Accepted", "accepted": "alice"}));
    let snapshot = bob.expect(MsgKind::FriendList).await;
    assert_eq!(snapshot, json!({"friends": ["alice"], "pending": []}));

    let notice = alice.expect(MsgKind::FriendResponse).await;
    assert_eq!(notice, json!({"accepted_by": "bob"}));
    let snapshot = alice.expect(MsgKind::FriendList).await;
    assert_eq!(snapshot, json!({"friends": ["bob"], "pending": []}));

    alice.send(MsgKind::FriendRequest, json!({"to": "bob"})).await;
    let resp = alice.expect(MsgKind::FriendResponse).await;
    assert_eq!(resp["message"], "Already friends");
}

#[tokio::test]
async fn membership_request_is_approved_by_admin() {
    let server = TestServer::start().await;
    for u in ["alice", "bob", "carol"] {
        server.seed_user(u, "pw").await;
    }
    server.befriend("bob", "carol").await;
    server.store.create_group("team", "alice").await.unwrap();
    server.store.add_member("team", "bob").await.unwrap();

    let mut alice = server.login("alice", "pw").await;
    let mut bob = server.login("bob", "pw").await;
    let mut carol = server.login("carol", "pw").await;

    bob.send(MsgKind::RequestAddMember, json!({"group": "team", "user": "carol"}))
        .await;
    let resp = bob.expect(MsgKind::RequestAddMemberResponse).await;
    assert_eq!(resp["ok"], true);
    assert_eq!(resp["message"], "Request sent to admin for approval");
    bob.expect_silence().await;

    let notice = alice.expect(MsgKind::RequestAddMemberResponse).await;
    assert_eq!(
        notice,
        json!({
            "ok": true,
            "message": "bob requested to add carol to team",
            "group": "team",
            "requester": "bob",
            "user": "carol"
        })
    );

    bob.send(MsgKind::GetMemberRequests, json!({"group": "team"})).await;
    let list = bob.expect(MsgKind::GetMemberRequestsResponse).await;
    assert_eq!(list["ok"], false);
    assert_eq!(list["requests"], json!([]));

    alice.send(MsgKind::GetMemberRequests, json!({"group": "team"})).await;
    let list = alice.expect(MsgKind::GetMemberRequestsResponse).await;
    assert_eq!(list["ok"], true);
    assert_eq!(list["requests"][0]["requester"], "bob");
    assert_eq!(list["requests"][0]["target"], "carol");
    assert_eq!(list["requests"][0]["status"], "pending");

    alice
        .send(MsgKind::ApproveMemberRequest, json!({"group": "team", "user": "carol"}))
        .await;
    let resp = alice.expect(MsgKind::ApproveMemberResponse).await;
    assert_eq!(resp["message"], "carol added to group");
    alice.expect(MsgKind::ServerInfo).await;
    let info = carol.expect(MsgKind::ServerInfo).await;
    assert_eq!(info["groups"], json!(["team"]));

    alice
        .send(MsgKind::ApproveMemberRequest, json!({"group": "team", "user": "carol"}))
        .await;
    let resp = alice.expect(MsgKind::ApproveMemberResponse).await;
    assert_eq!(resp["ok"], false);
    assert_eq!(resp["message"], "No pending request found");
    alice.expect_silence().await;

    assert_eq!(
        server.store.group_members("team").await.unwrap(),
        vec!["alice", "bob", "carol"]
    );
}

#[tokio::test]
async fn requests_before_login_are_dropped() {
    let server = TestServer::start().await;
    server.seed_user("alice", "pw").await;
    let mut client = server.connect().await;

    client.send(MsgKind::CreateGroup, json!({"group": "team"})).await;
    client.send(MsgKind::ServerInfo, json!({})).await;
    client.send(MsgKind::ListUsersRequest, json!({})).await;
    client.expect_silence().await;
    assert!(server.store.group("team").await.unwrap().is_none());

    // unknown kinds are ignored and the connection stays usable
    let mut unknown = Frame::new(MsgKind::ServerInfo, Default::default());
    unknown.kind = 200;
    client.send_frame(unknown).await;
    client
        .send(MsgKind::LoginRequest, json!({"username": "alice", "password": "pw"}))
        .await;
    let ack = client.expect(MsgKind::LoginResponse).await;
    assert_eq!(ack["ok"], true);
}

#[tokio::test]
async fn list_users_returns_every_account() {
    let server = TestServer::start().await;
    for u in ["carol", "alice", "bob"] {
        server.seed_user(u, "pw").await;
    }
    let mut alice = server.login("alice", "pw").await;

    alice.send(MsgKind::ListUsersRequest, json!({})).await;
    let list = alice.expect(MsgKind::ListUsersResponse).await;
    assert_eq!(list, json!({"users": ["alice", "bob", "carol"]}));
}

#[tokio::test]
async fn disconnect_releases_the_session() {
    let server = TestServer::start().await;
    server.seed_user("alice", "pw").await;
    let alice = server.login("alice", "pw").await;
    server.wait_online("alice", true).await;

    drop(alice);
    server.wait_online("alice", false).await;
}

#[tokio::test]
async fn message_at_the_frame_limit_does_not_disconnect_the_recipient() {
    let server = TestServer::start().await;
    server.seed_user("alice", "pw").await;
    server.seed_user("bob", "pw").await;
    let mut alice = server.login("alice", "pw").await;
    let mut bob = server.login("bob", "pw").await;

    // `{"text":"…","to":"bob"}` is 22 bytes around the text
    let limit = server.state.config.max_frame_len;
    let body = json!({"to": "bob", "text": "x".repeat(limit - 22)});
    assert_eq!(serde_json::to_vec(&body).unwrap().len(), limit);
    alice.send(MsgKind::PrivateMessage, body).await;

    // rebuilt with `from`, it no longer fits and is dropped
    bob.expect_silence().await;
    assert!(server.state.sessions.is_online("bob"));
    assert!(server.store.message_log().await.is_empty());

    alice
        .send(MsgKind::PrivateMessage, json!({"to": "bob", "text": "still there?"}))
        .await;
    let msg = bob.expect(MsgKind::PrivateMessage).await;
    assert_eq!(msg, json!({"from": "alice", "text": "still there?"}));

    bob.send(MsgKind::ServerInfo, json!({})).await;
    bob.expect(MsgKind::ServerInfo).await;
    alice.expect_silence().await;
}
