//! Application State
//!
//! Shared state accessible by all API handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::bridge::CommandPublisher;
use crate::config::ApiConfig;
use crate::persistence::PersistenceWorker;
use crate::websocket::HubHandle;

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Broadcast hub that viewer connections register with
    pub hub: HubHandle,
    /// Publisher for manual control commands
    pub publisher: CommandPublisher,
    /// Persistence worker, read for health counters only
    pub persistence: PersistenceWorker,
    /// API configuration
    pub config: Arc<ApiConfig>,
    /// Server start time for uptime tracking
    pub start_time: Instant,
    /// Viewers silent for longer than this are disconnected
    pub viewer_read_deadline: Duration,
}

impl AppState {
    pub fn new(
        hub: HubHandle,
        publisher: CommandPublisher,
        persistence: PersistenceWorker,
        config: ApiConfig,
        viewer_read_deadline: Duration,
    ) -> Self {
        Self {
            hub,
            publisher,
            persistence,
            config: Arc::new(config),
            start_time: Instant::now(),
            viewer_read_deadline,
        }
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
