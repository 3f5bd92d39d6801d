//! Accept loop.
//!
//! Each accepted socket gets its own handler task, wrapped in a supervisor
//! task that waits on it. A handler that panics is logged and its registry
//! entries are released; the listener and other connections carry on.

use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::handler::handle_connection;
use crate::state::AppState;

/// Accept connections until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()>,
{
    let addr = listener.local_addr()?;
    info!(%addr, instance = %state.config.server_instance, "chatd listening");

    tokio::pin!(shutdown);
    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    // per-connection failures (e.g. EMFILE, aborted handshake)
                    warn!("accept failed: {e}");
                    continue;
                }
            },
            () = &mut shutdown => {
                info!("shutdown requested, no longer accepting connections");
                return Ok(());
            }
        };

        let conn_id = Uuid::new_v4();
        let task = tokio::spawn(handle_connection(stream, peer, conn_id, Arc::clone(&state)));

        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(e) = task.await {
                let released = state.sessions.release_connection(conn_id);
                if e.is_panic() {
                    error!(conn = %conn_id, %peer, released, "connection handler panicked");
                } else {
                    warn!(conn = %conn_id, %peer, released, "connection handler cancelled");
                }
            }
        });
    }
}

/// Serve until the process receives Ctrl-C.
pub async fn serve_until_ctrl_c(listener: TcpListener, state: Arc<AppState>) -> std::io::Result<()> {
    serve(listener, state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    })
    .await
}
