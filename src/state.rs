use std::sync::Arc;
use std::time::Instant;

use crate::config::ServerConfig;
use crate::registry::Registry;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub config: ServerConfig,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            registry: Arc::new(Registry::new()),
            config,
            started_at: Instant::now(),
        }
    }
}
