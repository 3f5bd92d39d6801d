//! In-process directory store.
//!
//! Backs `STORE_BACKEND=memory` and the test suite. Every operation takes
//! the single table lock, so each call is atomic with respect to the others.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{
    DirectoryStore, FriendEdge, FriendStatus, GroupRecord, MemberRequestRecord, RequestStatus,
    UserRecord,
};
use crate::error::StoreError;

/// A persisted chat message. `group` is `None` for private messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedMessage {
    pub from: String,
    pub to: Option<String>,
    pub group: Option<String>,
    pub text: String,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Tables {
    next_id: i64,
    users: Vec<UserRecord>,
    groups: Vec<GroupRecord>,
    /// (group, member) in join order.
    members: Vec<(String, String)>,
    friend_edges: Vec<FriendEdge>,
    member_requests: Vec<MemberRequestRecord>,
    messages: Vec<LoggedMessage>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn user_exists(&self, username: &str) -> bool {
        self.users.iter().any(|u| u.username == username)
    }

    fn group_exists(&self, name: &str) -> bool {
        self.groups.iter().any(|g| g.name == name)
    }

    fn is_member(&self, group: &str, username: &str) -> bool {
        self.members.iter().any(|(g, u)| g == group && u == username)
    }

    fn require_user(&self, username: &str) -> Result<(), StoreError> {
        if self.user_exists(username) {
            Ok(())
        } else {
            Err(StoreError::Constraint(format!("no such user: {username}")))
        }
    }

    fn require_group(&self, name: &str) -> Result<(), StoreError> {
        if self.group_exists(name) {
            Ok(())
        } else {
            Err(StoreError::Constraint(format!("no such group: {name}")))
        }
    }

    fn edge(&self, a: &str, b: &str) -> Option<&FriendEdge> {
        self.friend_edges.iter().find(|e| {
            (e.requester == a && e.addressee == b) || (e.requester == b && e.addressee == a)
        })
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything persisted through the message log calls, oldest first.
    pub async fn message_log(&self) -> Vec<LoggedMessage> {
        self.tables.lock().await.messages.clone()
    }

    /// All membership requests for `group` regardless of status.
    pub async fn member_requests(&self, group: &str) -> Vec<MemberRequestRecord> {
        self.tables
            .lock()
            .await
            .member_requests
            .iter()
            .filter(|r| r.group == group)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl DirectoryStore for MemoryStore {
    async fn user_by_username(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        let t = self.tables.lock().await;
        Ok(t.users.iter().find(|u| u.username == username).cloned())
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let t = self.tables.lock().await;
        Ok(t.users.iter().find(|u| u.email == email).cloned())
    }

    async fn create_user(
        &self,
        email: &str,
        username: &str,
        password_hash: &str,
    ) -> Result<bool, StoreError> {
        let mut t = self.tables.lock().await;
        if t.users
            .iter()
            .any(|u| u.email == email || u.username == username)
        {
            return Ok(false);
        }
        let id = t.next_id();
        t.users.push(UserRecord {
            id,
            email: email.to_owned(),
            username: username.to_owned(),
            password_hash: password_hash.to_owned(),
        });
        Ok(true)
    }

    async fn list_usernames(&self) -> Result<Vec<String>, StoreError> {
        let t = self.tables.lock().await;
        let mut names: Vec<String> = t.users.iter().map(|u| u.username.clone()).collect();
        names.sort();
        Ok(names)
    }

    async fn group(&self, name: &str) -> Result<Option<GroupRecord>, StoreError> {
        let t = self.tables.lock().await;
        Ok(t.groups.iter().find(|g| g.name == name).cloned())
    }

    async fn create_group(&self, name: &str, admin: &str) -> Result<bool, StoreError> {
        let mut t = self.tables.lock().await;
        t.require_user(admin)?;
        if t.group_exists(name) {
            return Ok(false);
        }
        let id = t.next_id();
        t.groups.push(GroupRecord {
            id,
            name: name.to_owned(),
            admin: Some(admin.to_owned()),
        });
        t.members.push((name.to_owned(), admin.to_owned()));
        Ok(true)
    }

    async fn user_groups(&self, username: &str) -> Result<Vec<String>, StoreError> {
        let t = self.tables.lock().await;
        let mut groups: Vec<String> = t
            .members
            .iter()
            .filter(|(_, u)| u == username)
            .map(|(g, _)| g.clone())
            .collect();
        groups.sort();
        Ok(groups)
    }

    async fn group_members(&self, group: &str) -> Result<Vec<String>, StoreError> {
        let t = self.tables.lock().await;
        Ok(t.members
            .iter()
            .filter(|(g, _)| g == group)
            .map(|(_, u)| u.clone())
            .collect())
    }

    async fn is_member(&self, group: &str, username: &str) -> Result<bool, StoreError> {
        Ok(self.tables.lock().await.is_member(group, username))
    }

    async fn add_member(&self, group: &str, username: &str) -> Result<bool, StoreError> {
        let mut t = self.tables.lock().await;
        t.require_group(group)?;
        t.require_user(username)?;
        if t.is_member(group, username) {
            return Ok(false);
        }
        t.members.push((group.to_owned(), username.to_owned()));
        Ok(true)
    }

    async fn remove_member(&self, group: &str, username: &str) -> Result<bool, StoreError> {
        let mut t = self.tables.lock().await;
        let before = t.members.len();
        t.members.retain(|(g, u)| !(g == group && u == username));
        Ok(t.members.len() < before)
    }

    async fn save_private_message(
        &self,
        from: &str,
        to: &str,
        text: &str,
    ) -> Result<(), StoreError> {
        let mut t = self.tables.lock().await;
        t.require_user(from)?;
        t.require_user(to)?;
        t.messages.push(LoggedMessage {
            from: from.to_owned(),
            to: Some(to.to_owned()),
            group: None,
            text: text.to_owned(),
            sent_at: Utc::now(),
        });
        Ok(())
    }

    async fn save_group_message(
        &self,
        group: &str,
        from: &str,
        text: &str,
    ) -> Result<(), StoreError> {
        let mut t = self.tables.lock().await;
        t.require_group(group)?;
        t.require_user(from)?;
        t.messages.push(LoggedMessage {
            from: from.to_owned(),
            to: None,
            group: Some(group.to_owned()),
            text: text.to_owned(),
            sent_at: Utc::now(),
        });
        Ok(())
    }

    async fn friendship(&self, a: &str, b: &str) -> Result<Option<FriendEdge>, StoreError> {
        Ok(self.tables.lock().await.edge(a, b).cloned())
    }

    async fn create_friend_request(
        &self,
        requester: &str,
        addressee: &str,
    ) -> Result<bool, StoreError> {
        let mut t = self.tables.lock().await;
        t.require_user(requester)?;
        t.require_user(addressee)?;
        if t.edge(requester, addressee).is_some() {
            return Ok(false);
        }
        t.friend_edges.push(FriendEdge {
            requester: requester.to_owned(),
            addressee: addressee.to_owned(),
            status: FriendStatus::Pending,
        });
        Ok(true)
    }

    async fn accept_friend_request(
        &self,
        addressee: &str,
        requester: &str,
    ) -> Result<bool, StoreError> {
        let mut t = self.tables.lock().await;
        let edge = t.friend_edges.iter_mut().find(|e| {
            e.requester == requester && e.addressee == addressee && e.status == FriendStatus::Pending
        });
        match edge {
            Some(edge) => {
                edge.status = FriendStatus::Accepted;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn friends(&self, username: &str) -> Result<Vec<String>, StoreError> {
        let t = self.tables.lock().await;
        let mut friends: Vec<String> = t
            .friend_edges
            .iter()
            .filter(|e| e.status == FriendStatus::Accepted)
            .filter_map(|e| {
                if e.requester == username {
                    Some(e.addressee.clone())
                } else if e.addressee == username {
                    Some(e.requester.clone())
                } else {
                    None
                }
            })
            .collect();
        friends.sort();
        Ok(friends)
    }

    async fn pending_friend_requests(&self, username: &str) -> Result<Vec<String>, StoreError> {
        let t = self.tables.lock().await;
        Ok(t.friend_edges
            .iter()
            .filter(|e| e.addressee == username && e.status == FriendStatus::Pending)
            .map(|e| e.requester.clone())
            .collect())
    }

    async fn create_member_request(
        &self,
        group: &str,
        requester: &str,
        target: &str,
    ) -> Result<bool, StoreError> {
        let mut t = self.tables.lock().await;
        t.require_group(group)?;
        t.require_user(requester)?;
        t.require_user(target)?;
        if t.member_requests
            .iter()
            .any(|r| r.group == group && r.requester == requester && r.target == target)
        {
            return Ok(false);
        }
        let id = t.next_id();
        t.member_requests.push(MemberRequestRecord {
            id,
            group: group.to_owned(),
            requester: requester.to_owned(),
            target: target.to_owned(),
            status: RequestStatus::Pending,
        });
        Ok(true)
    }

    async fn pending_member_requests(
        &self,
        group: &str,
    ) -> Result<Vec<MemberRequestRecord>, StoreError> {
        let t = self.tables.lock().await;
        Ok(t.member_requests
            .iter()
            .filter(|r| r.group == group && r.status == RequestStatus::Pending)
            .cloned()
            .collect())
    }

    async fn approve_member_request(&self, group: &str, target: &str) -> Result<bool, StoreError> {
        let mut t = self.tables.lock().await;
        let pending = |r: &MemberRequestRecord| {
            r.group == group && r.target == target && r.status == RequestStatus::Pending
        };
        if !t.member_requests.iter().any(pending) {
            return Ok(false);
        }
        if t.is_member(group, target) {
            return Err(StoreError::Constraint(format!(
                "{target} is already a member of {group}"
            )));
        }
        t.members.push((group.to_owned(), target.to_owned()));
        for r in t.member_requests.iter_mut().filter(|r| pending(r)) {
            r.status = RequestStatus::Approved;
        }
        Ok(true)
    }

    async fn reject_member_request(&self, group: &str, target: &str) -> Result<bool, StoreError> {
        let mut t = self.tables.lock().await;
        let mut changed = false;
        for r in t.member_requests.iter_mut().filter(|r| {
            r.group == group && r.target == target && r.status == RequestStatus::Pending
        }) {
            r.status = RequestStatus::Rejected;
            changed = true;
        }
        Ok(changed)
    }
}
