//! Per-connection session state, owned by the connection handler.

use std::net::SocketAddr;

use uuid::Uuid;

use crate::channel::Outbound;
use crate::ops::Actor;
use crate::state::AppState;

pub struct Session {
    peer: SocketAddr,
    out: Outbound,
    identity: Option<String>,
}

impl Session {
    pub fn new(peer: SocketAddr, out: Outbound) -> Self {
        Self {
            peer,
            out,
            identity: None,
        }
    }

    pub fn conn_id(&self) -> Uuid {
        self.out.conn_id()
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn out(&self) -> &Outbound {
        &self.out
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn actor(&self) -> Option<Actor<'_>> {
        self.identity.as_deref().map(|name| Actor {
            name,
            out: &self.out,
        })
    }

    /// Register this connection as `identity`'s live channel. A different
    /// identity previously bound here is released first.
    pub fn login(&mut self, state: &AppState, identity: &str) {
        if let Some(previous) = self.identity.take() {
            if previous != identity {
                state.sessions.unregister(&previous, self.conn_id());
            }
        }
        state.sessions.register(identity, self.out.clone());
        self.identity = Some(identity.to_owned());
    }

    /// Release the registry entry if this connection still owns it.
    pub fn logout(&mut self, state: &AppState) {
        if let Some(identity) = self.identity.take() {
            state.sessions.unregister(&identity, self.conn_id());
        }
    }
}
