//! Error types for chatd.
//!
//! Three layers:
//! - [`ChatError`]: transport-level failures. These end a connection.
//! - [`StoreError`]: directory store failures, never fatal to a connection.
//! - [`Rejection`]: the user-visible reason an operation was refused. Its
//!   `Display` text is exactly what goes back to the client.

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("frame payload of {len} bytes exceeds limit of {max}")]
    FrameTooLarge { len: usize, max: usize },

    #[error("serialize error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("outbound write timed out")]
    PushTimeout,

    #[error("channel closed")]
    ChannelClosed,
}

impl ChatError {
    /// Whether the underlying stream is unusable after this failure.
    /// Oversized or unserializable frames leave it intact.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Io(_) | Self::PushTimeout | Self::ChannelClosed)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("constraint violated: {0}")]
    Constraint(String),

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

/// Which admin-only action was attempted by a non-admin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminAction {
    AddMembers,
    RemoveMembers,
    ApproveRequests,
    RejectRequests,
    ViewRequests,
}

impl AdminAction {
    fn verb(&self) -> &'static str {
        match self {
            Self::AddMembers => "add members",
            Self::RemoveMembers => "remove members",
            Self::ApproveRequests => "approve requests",
            Self::RejectRequests => "reject requests",
            Self::ViewRequests => "view requests",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Rejection {
    // ── validation ──────────────────────────────────────────
    #[error("Username & password required")]
    MissingCredentials,

    #[error("Enter a valid email")]
    InvalidEmail,

    #[error("{0} required")]
    MissingField(&'static str),

    #[error("Cannot friend yourself")]
    SelfFriend,

    #[error("Admin cannot remove themselves")]
    AdminSelfRemoval,

    // ── authentication / signup ─────────────────────────────
    #[error("Unknown user")]
    UnknownUser,

    #[error("Invalid password")]
    InvalidPassword,

    #[error("Email already used")]
    EmailInUse,

    #[error("No signup started")]
    NoPendingSignup,

    #[error("Incorrect code")]
    CodeMismatch,

    #[error("Email not verified")]
    NotVerified,

    #[error("Username exists")]
    UsernameTaken,

    #[error("Account creation failed")]
    AccountNotCreated,

    // ── authorization ───────────────────────────────────────
    #[error("Only group admin can {}", .0.verb())]
    NotGroupAdmin(AdminAction),

    #[error("You are not in this group")]
    NotGroupMember,

    // ── state conflicts ─────────────────────────────────────
    #[error("Group name already exists")]
    GroupNameTaken,

    #[error("Already friends")]
    AlreadyFriends,

    #[error("Request already pending")]
    FriendRequestPending,

    #[error("Request already pending for this user")]
    MemberRequestExists,

    #[error("User is already in this group")]
    AlreadyMember,

    #[error("Can only add friends")]
    NotAdminsFriend,

    #[error("You are not friends with this user")]
    NotRequestersFriend,

    // ── not found ───────────────────────────────────────────
    #[error("User not found")]
    UserNotFound,

    #[error("Group not found")]
    GroupNotFound,

    #[error("User not in group")]
    NotInGroup,

    #[error("No pending request")]
    NoPendingFriendRequest,

    #[error("No pending request found")]
    NoPendingMemberRequest,

    // ── collaborator ────────────────────────────────────────
    #[error("Server error, please try again")]
    Store(#[from] StoreError),
}
