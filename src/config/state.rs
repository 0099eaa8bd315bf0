// Application state module
// Shared state of the gateway: configuration, handler and counters

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use super::types::Config;
use crate::cgi::RequestHandler;

/// Application state shared by every connection task
pub struct AppState {
    pub config: Config,
    pub handler: RequestHandler,
    pub active_connections: Arc<AtomicUsize>,

    // Cached config values for fast access
    pub cached_access_log: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
            handler: RequestHandler::new(config.cgi.handler_options()),
            active_connections: Arc::new(AtomicUsize::new(0)),
            cached_access_log: Arc::new(AtomicBool::new(config.logging.access_log)),
        }
    }

    pub fn access_log_enabled(&self) -> bool {
        self.cached_access_log.load(Ordering::Relaxed)
    }

    pub fn active_connection_count(&self) -> usize {
        self.active_connections.load(Ordering::SeqCst)
    }
}
