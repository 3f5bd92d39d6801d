//! Directory store: durable users, groups, memberships, friendships,
//! membership requests and message logs.
//!
//! The core only talks to the [`DirectoryStore`] trait. Authorization and
//! eligibility rules live in the operations layer; implementations provide
//! lookups and atomic primitives that report uniqueness conflicts as
//! `Ok(false)` instead of an error.

mod memory;
mod postgres;

use async_trait::async_trait;

use crate::error::StoreError;

pub use memory::{LoggedMessage, MemoryStore};
pub use postgres::PgStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRecord {
    pub id: i64,
    pub name: String,
    /// `None` once the admin account is gone.
    pub admin: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FriendStatus {
    Pending,
    Accepted,
}

impl FriendStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            _ => None,
        }
    }
}

/// A friendship row. Directed while pending, symmetric once accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FriendEdge {
    pub requester: String,
    pub addressee: String,
    pub status: FriendStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRequestRecord {
    pub id: i64,
    pub group: String,
    pub requester: String,
    pub target: String,
    pub status: RequestStatus,
}

#[async_trait]
pub trait DirectoryStore: Send + Sync {
    // ── users ───────────────────────────────────────────────
    async fn user_by_username(&self, username: &str) -> Result<Option<UserRecord>, StoreError>;

    async fn user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError>;

    /// `false` when the email or username is already taken.
    async fn create_user(
        &self,
        email: &str,
        username: &str,
        password_hash: &str,
    ) -> Result<bool, StoreError>;

    /// Every username, alphabetically.
    async fn list_usernames(&self) -> Result<Vec<String>, StoreError>;

    // ── groups ──────────────────────────────────────────────
    async fn group(&self, name: &str) -> Result<Option<GroupRecord>, StoreError>;

    /// Create `name` with `admin` as admin and first member, atomically.
    /// `false` when the name is taken.
    async fn create_group(&self, name: &str, admin: &str) -> Result<bool, StoreError>;

    /// Groups `username` belongs to, alphabetically.
    async fn user_groups(&self, username: &str) -> Result<Vec<String>, StoreError>;

    /// Members of `group` in join order.
    async fn group_members(&self, group: &str) -> Result<Vec<String>, StoreError>;

    async fn is_member(&self, group: &str, username: &str) -> Result<bool, StoreError>;

    /// `false` when already a member.
    async fn add_member(&self, group: &str, username: &str) -> Result<bool, StoreError>;

    /// `false` when not a member.
    async fn remove_member(&self, group: &str, username: &str) -> Result<bool, StoreError>;

    // ── message logs ────────────────────────────────────────
    async fn save_private_message(&self, from: &str, to: &str, text: &str)
        -> Result<(), StoreError>;

    async fn save_group_message(&self, group: &str, from: &str, text: &str)
        -> Result<(), StoreError>;

    // ── friends ─────────────────────────────────────────────
    /// The relationship row between `a` and `b` in either direction.
    async fn friendship(&self, a: &str, b: &str) -> Result<Option<FriendEdge>, StoreError>;

    /// `false` when any row already exists for the pair, in either direction.
    async fn create_friend_request(
        &self,
        requester: &str,
        addressee: &str,
    ) -> Result<bool, StoreError>;

    /// Accept the pending row `requester → addressee`. `false` if none.
    async fn accept_friend_request(
        &self,
        addressee: &str,
        requester: &str,
    ) -> Result<bool, StoreError>;

    /// Accepted friends of `username`, alphabetically.
    async fn friends(&self, username: &str) -> Result<Vec<String>, StoreError>;

    /// Requesters with a pending request addressed to `username`, oldest first.
    async fn pending_friend_requests(&self, username: &str) -> Result<Vec<String>, StoreError>;

    // ── membership requests ─────────────────────────────────
    /// `false` when a row for (group, requester, target) already exists.
    async fn create_member_request(
        &self,
        group: &str,
        requester: &str,
        target: &str,
    ) -> Result<bool, StoreError>;

    /// Pending requests for `group`, oldest first.
    async fn pending_member_requests(
        &self,
        group: &str,
    ) -> Result<Vec<MemberRequestRecord>, StoreError>;

    /// Add `target` to `group` and mark every pending request for
    /// (`group`, `target`) approved, whoever filed it, as one unit. At most
    /// one membership is added. `false` (and nothing applied) when no
    /// pending request exists.
    async fn approve_member_request(&self, group: &str, target: &str) -> Result<bool, StoreError>;

    /// Mark every pending request for (`group`, `target`) rejected, whoever
    /// filed it. `false` if none.
    async fn reject_member_request(&self, group: &str, target: &str) -> Result<bool, StoreError>;
}
