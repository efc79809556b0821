use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::hub::Hub;
use shared::{Description, Players, Status, Version, PROTOCOL_VERSION, VERSION_NAME};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Process-wide state shared by every connection
#[derive(Debug)]
pub struct Game {
    config: ServerConfig,
    hub: Hub,
    next_session_id: AtomicU32,
}

impl Game {
    /// Spawns the hub and wraps everything in an `Arc` for the connection tasks.
    pub fn start(config: ServerConfig) -> Arc<Self> {
        let hub = Hub::spawn(config.max_players, config.hub_queue_size);
        Arc::new(Self {
            config,
            hub,
            next_session_id: AtomicU32::new(1),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    pub fn max_players(&self) -> usize {
        self.config.max_players
    }

    pub fn allocate_session_id(&self) -> u32 {
        self.next_session_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Snapshot answered to status requests.
    pub async fn status(&self) -> Result<Status, ServerError> {
        let online = self.hub.online().await?;
        Ok(Status {
            version: Version {
                name: VERSION_NAME.to_string(),
                protocol: PROTOCOL_VERSION,
            },
            players: Players {
                max: self.config.max_players,
                online,
            },
            description: Description {
                text: self.config.motd.clone(),
            },
        })
    }
}
