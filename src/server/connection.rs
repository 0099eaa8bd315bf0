// Connection handling module
// Accepts a single TCP connection and serves it with the gateway

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::sync::watch;

use super::gateway::{self, ConnectionInfo};
use crate::config::AppState;
use crate::logger;

/// Accept a connection, enforcing the connection cap.
///
/// Returns `false` when the connection was rejected.
///
/// # Arguments
///
/// * `stream` - The TCP stream to handle
/// * `peer_addr` - The peer's socket address
/// * `local_addr` - The listener's address, exposed to the handler as `SERVER_PORT`
/// * `state` - Shared application state
/// * `draining` - Turns `true` when the server shuts down
pub fn accept_connection(
    stream: tokio::net::TcpStream,
    peer_addr: SocketAddr,
    local_addr: SocketAddr,
    state: &Arc<AppState>,
    draining: watch::Receiver<bool>,
) -> bool {
    // Increment first, then check, so two accepts cannot both slip under the cap
    let prev_count = state.active_connections.fetch_add(1, Ordering::SeqCst);

    if let Some(max_conn) = state.config.performance.max_connections {
        if prev_count >= usize::try_from(max_conn).unwrap_or(usize::MAX) {
            state.active_connections.fetch_sub(1, Ordering::SeqCst);
            logger::log_warning(&format!(
                "Max connections reached: {prev_count}/{max_conn}. Connection rejected."
            ));
            drop(stream);
            return false;
        }
    }

    if state.access_log_enabled() {
        logger::log_connection_accepted(&peer_addr);
    }

    handle_connection(
        stream,
        ConnectionInfo {
            peer_addr,
            local_addr,
        },
        Arc::clone(state),
        draining,
    );
    true
}

/// Serve one connection in a task on the current `LocalSet`.
///
/// The whole connection shares one deadline of
/// `max(read_timeout, write_timeout)`. The connection counter is
/// decremented when the task ends, whatever the outcome. Once `draining`
/// turns `true` the connection finishes its in-flight request and closes.
fn handle_connection(
    stream: tokio::net::TcpStream,
    conn: ConnectionInfo,
    state: Arc<AppState>,
    mut draining: watch::Receiver<bool>,
) {
    tokio::task::spawn_local(async move {
        let io = TokioIo::new(stream);
        let timeout_duration = state.config.performance.connection_timeout();

        let mut builder = http1::Builder::new();
        builder.keep_alive(state.config.performance.keep_alive);

        let service_state = Arc::clone(&state);
        let mut connection = std::pin::pin!(builder.serve_connection(
            io,
            service_fn(move |req| gateway::handle_request(req, Arc::clone(&service_state), conn)),
        ));

        let serve = async {
            tokio::select! {
                result = connection.as_mut() => return result,
                _ = draining.wait_for(|&stop| stop) => {}
            }
            connection.as_mut().graceful_shutdown();
            connection.as_mut().await
        };

        match tokio::time::timeout(timeout_duration, serve).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => logger::log_connection_error(&err),
            Err(_) => {
                logger::log_warning(&format!(
                    "Connection from {} timed out after {} seconds",
                    conn.peer_addr,
                    timeout_duration.as_secs()
                ));
            }
        }

        state.active_connections.fetch_sub(1, Ordering::SeqCst);
    });
}
