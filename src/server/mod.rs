// Gateway server module entry
// Listener setup, connection handling and shutdown for `--serve` mode

pub mod connection;
pub mod gateway;
pub mod listener;
pub mod shutdown;

// `loop` is a keyword, so the file is mounted as `server_loop`
#[path = "loop.rs"]
pub mod server_loop;

pub use listener::create_listener;
pub use server_loop::start_server_loop;

use std::sync::Arc;
use tokio::sync::Notify;

use crate::config::{AppState, Config};
use crate::logger;

/// Bind and serve until SIGINT/SIGTERM. Must run inside a tokio runtime.
pub async fn run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let addr = config.get_socket_addr()?;
    let listener = create_listener(addr, config.server.backlog)?;
    let state = Arc::new(AppState::new(config));
    let shutdown = Arc::new(Notify::new());

    shutdown::start_signal_handler(Arc::clone(&shutdown));
    logger::log_server_start(&listener.local_addr()?, config);

    serve(listener, state, shutdown).await
}

/// Serve an already bound listener until `shutdown` is notified
pub async fn serve(
    listener: tokio::net::TcpListener,
    state: Arc<AppState>,
    shutdown: Arc<Notify>,
) -> Result<(), Box<dyn std::error::Error>> {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(start_server_loop(listener, state, shutdown))
        .await
}
