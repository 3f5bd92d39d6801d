//! chatd: real-time chat server.
//!
//! Clients hold one framed TCP connection each. The server authenticates
//! them, routes private and group messages, and keeps group membership and
//! friend state in sync across everyone online by pushing full snapshots
//! after every change.

pub mod channel;
pub mod config;
pub mod credentials;
pub mod delivery;
pub mod error;
pub mod fanout;
pub mod handler;
pub mod health;
pub mod ledger;
pub mod ops;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod state;
pub mod store;
pub mod types;
