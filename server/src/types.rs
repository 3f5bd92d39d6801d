//! Payload bodies for each message kind.
//!
//! Request fields default to empty strings so a missing key behaves like an
//! empty one. Responses keep the key names clients already rely on
//! (`ok`, `message` / `error`, `group`, `user`, ...).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════
// Client → Server
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SignupEmailRequest {
    pub email: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct VerifyEmailRequest {
    pub email: String,
    pub code: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SetCredentialsRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PrivateMessageRequest {
    pub to: String,
    pub text: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GroupMessageRequest {
    pub group: String,
    pub text: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GroupRequest {
    pub group: String,
}

/// Add/remove member, request-add, approve and reject all carry these.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GroupMemberRequest {
    pub group: String,
    pub user: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FriendRequestBody {
    pub to: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FriendAcceptBody {
    pub from: String,
}

// ═══════════════════════════════════════════════════════════════
// Server → Client
// ═══════════════════════════════════════════════════════════════

/// Signup and credential responses: `message` on success, `error` otherwise.
#[derive(Debug, Serialize)]
pub struct AuthReply {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuthReply {
    pub fn from_result(result: Result<String, String>) -> Self {
        match result {
            Ok(message) => Self {
                ok: true,
                message: Some(message),
                error: None,
            },
            Err(error) => Self {
                ok: false,
                message: None,
                error: Some(error),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoginAccepted {
    pub ok: bool,
    pub username: String,
    pub groups: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatDelivery {
    pub from: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub text: String,
}

/// Outcome of a group or friend operation, echoed back with its arguments.
#[derive(Debug, Serialize)]
pub struct OpReply {
    pub ok: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted: Option<String>,
}

impl OpReply {
    pub fn new(result: Result<String, String>) -> Self {
        let (ok, message) = match result {
            Ok(m) => (true, m),
            Err(m) => (false, m),
        };
        Self {
            ok,
            message,
            group: None,
            user: None,
            to: None,
            accepted: None,
        }
    }

    pub fn group(mut self, group: &str) -> Self {
        self.group = Some(group.to_owned());
        self
    }

    pub fn user(mut self, user: &str) -> Self {
        self.user = Some(user.to_owned());
        self
    }

    pub fn to(mut self, to: &str) -> Self {
        self.to = Some(to.to_owned());
        self
    }

    pub fn accepted(mut self, requester: &str) -> Self {
        self.accepted = Some(requester.to_owned());
        self
    }
}

/// Unsolicited notice to a group admin that a member asked to add someone.
#[derive(Debug, Serialize)]
pub struct MemberRequestNotice {
    pub ok: bool,
    pub message: String,
    pub group: String,
    pub requester: String,
    pub user: String,
}

#[derive(Debug, Serialize)]
pub struct IncomingFriendRequest {
    pub incoming: bool,
    pub from: String,
}

#[derive(Debug, Serialize)]
pub struct FriendAccepted {
    pub accepted_by: String,
}

/// Full friend state for one identity.
#[derive(Debug, Default, Serialize)]
pub struct FriendSnapshot {
    pub friends: Vec<String>,
    /// Usernames with a pending request addressed to this identity.
    pub pending: Vec<String>,
}

/// Full server view for one identity.
#[derive(Debug, Default, Serialize)]
pub struct ServerInfo {
    /// Everyone currently online.
    pub users: Vec<String>,
    pub groups: Vec<String>,
    pub group_members: BTreeMap<String, Vec<String>>,
    pub group_admins: BTreeMap<String, Option<String>>,
}

#[derive(Debug, Serialize)]
pub struct UserList {
    pub users: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberRequestView {
    pub id: i64,
    pub requester: String,
    pub target: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct MemberRequestList {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub group: String,
    pub requests: Vec<MemberRequestView>,
}
