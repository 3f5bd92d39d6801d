//! HTTP side channel for liveness probes and a small stats view.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct Stats {
    pub instance: String,
    /// Identities with a live session.
    pub online: usize,
    /// Signups started but not yet finalized.
    pub pending_signups: usize,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/stats", get(stats))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Liveness probe.
async fn healthz() -> &'static str {
    "ok"
}

async fn stats(State(state): State<Arc<AppState>>) -> Json<Stats> {
    Json(Stats {
        instance: state.config.server_instance.clone(),
        online: state.sessions.len(),
        pending_signups: state.ledger.len(),
    })
}
