// Server loop module
// Accepts connections until shutdown, then drains active ones

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{watch, Notify};

use super::connection::accept_connection;
use crate::config::AppState;
use crate::logger;

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Accept connections on `listener` until `shutdown` is notified.
///
/// Must run inside a `LocalSet`: connections are served with `spawn_local`.
/// After shutdown the listener is closed at once, active connections are
/// told to finish their current request and close, and they get up to one
/// connection timeout to do so.
#[allow(clippy::ignored_unit_patterns)]
pub async fn start_server_loop(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: Arc<Notify>,
) -> Result<(), Box<dyn std::error::Error>> {
    let local_addr = listener.local_addr()?;
    let (drain_tx, drain_rx) = watch::channel(false);

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => {
                        accept_connection(stream, peer_addr, local_addr, &state, drain_rx.clone());
                    }
                    Err(e) => {
                        logger::log_error(&format!("Failed to accept connection: {e}"));
                    }
                }
            }

            _ = shutdown.notified() => {
                break;
            }
        }
    }

    drop(listener);
    drain_tx.send_replace(true);
    logger::log_shutdown(state.active_connection_count());
    drain_connections(&state).await;
    Ok(())
}

async fn drain_connections(state: &AppState) {
    let deadline = tokio::time::Instant::now() + state.config.performance.connection_timeout();

    while state.active_connection_count() > 0 {
        if tokio::time::Instant::now() >= deadline {
            logger::log_warning(&format!(
                "Drain deadline reached with {} connections still active",
                state.active_connection_count()
            ));
            return;
        }
        tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
    }
    logger::log_info("All connections closed");
}
