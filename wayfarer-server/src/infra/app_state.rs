use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use wayfarer_core::HubHandle;

use crate::infra::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub hub: HubHandle,
    pub config: Arc<Config>,
    pub started_at: DateTime<Utc>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("hub_closed", &self.hub.is_closed())
            .field("started_at", &self.started_at)
            .finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(hub: HubHandle, config: Config) -> Self {
        Self {
            hub,
            config: Arc::new(config),
            started_at: Utc::now(),
        }
    }
}
