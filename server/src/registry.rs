//! Session registry: who is online, and on which channel.
//!
//! One entry per identity. A later login overwrites an earlier one; removal
//! is conditional on the connection id so a stale handler can never evict
//! the session that replaced it.

use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use crate::channel::Outbound;

#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, Outbound>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `identity` to `outbound`, returning whatever it replaced.
    /// The replaced channel is left open.
    pub fn register(&self, identity: &str, outbound: Outbound) -> Option<Outbound> {
        let previous = self.sessions.insert(identity.to_owned(), outbound);
        if let Some(prev) = &previous {
            debug!(identity, conn = %prev.conn_id(), "session replaced by newer login");
        }
        previous
    }

    /// Remove `identity` only if it is still bound to connection `conn_id`.
    pub fn unregister(&self, identity: &str, conn_id: Uuid) -> bool {
        self.sessions
            .remove_if(identity, |_, out| out.conn_id() == conn_id)
            .is_some()
    }

    /// Drop every entry owned by `conn_id`. Used when a handler dies without
    /// reaching its own cleanup.
    pub fn release_connection(&self, conn_id: Uuid) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, out| out.conn_id() != conn_id);
        before.saturating_sub(self.sessions.len())
    }

    /// The live channel for `identity`. Cloned out so no map lock is held
    /// while the caller writes.
    pub fn lookup(&self, identity: &str) -> Option<Outbound> {
        self.sessions.get(identity).map(|entry| entry.value().clone())
    }

    pub fn is_online(&self, identity: &str) -> bool {
        self.sessions.contains_key(identity)
    }

    /// Online identities, sorted. May be stale by the time it is used.
    pub fn snapshot(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::protocol::FrameCodec;

    fn channel() -> Outbound {
        let (_client, server) = tokio::io::duplex(64);
        Outbound::new(
            Uuid::new_v4(),
            server,
            FrameCodec::default(),
            Duration::from_secs(1),
        )
    }

    #[test]
    fn later_login_wins_and_old_channel_stays_open() {
        let registry = SessionRegistry::new();
        let first = channel();
        let second = channel();

        assert!(registry.register("alice", first.clone()).is_none());
        let replaced = registry.register("alice", second.clone()).unwrap();

        assert_eq!(replaced.conn_id(), first.conn_id());
        assert!(!first.is_closed());
        assert_eq!(
            registry.lookup("alice").unwrap().conn_id(),
            second.conn_id()
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn stale_handler_cannot_evict_newer_session() {
        let registry = SessionRegistry::new();
        let first = channel();
        let second = channel();
        registry.register("alice", first.clone());
        registry.register("alice", second.clone());

        assert!(!registry.unregister("alice", first.conn_id()));
        assert!(registry.is_online("alice"));
        assert!(registry.unregister("alice", second.conn_id()));
        assert!(registry.is_empty());
    }

    #[test]
    fn snapshot_and_release() {
        let registry = SessionRegistry::new();
        let shared = channel();
        registry.register("carol", shared.clone());
        registry.register("bob", shared.clone());
        registry.register("dave", channel());

        assert_eq!(registry.snapshot(), vec!["bob", "carol", "dave"]);
        assert_eq!(registry.release_connection(shared.conn_id()), 2);
        assert_eq!(registry.snapshot(), vec!["dave"]);
    }
}
