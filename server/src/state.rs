//! Shared server state: directory store, online sessions, pending signups.

use std::sync::Arc;

use crate::config::Config;
use crate::delivery::CodeDelivery;
use crate::ledger::VerificationLedger;
use crate::protocol::FrameCodec;
use crate::registry::SessionRegistry;
use crate::store::DirectoryStore;

/// Shared state accessible from all connection handlers.
pub struct AppState {
    pub store: Arc<dyn DirectoryStore>,
    /// Online identities and their channels.
    pub sessions: SessionRegistry,
    /// Signups waiting for code verification or credentials.
    pub ledger: VerificationLedger,
    pub delivery: Arc<dyn CodeDelivery>,
    pub config: Config,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn DirectoryStore>,
        delivery: Arc<dyn CodeDelivery>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            sessions: SessionRegistry::new(),
            ledger: VerificationLedger::new(),
            delivery,
            config,
        })
    }

    pub fn codec(&self) -> FrameCodec {
        FrameCodec::new(self.config.max_frame_len)
    }
}
