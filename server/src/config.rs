//! Server configuration.
//!
//! Only the listen address and the player cap are exposed on the command
//! line; everything else keeps its default outside of tests.

use shared::DEFAULT_COMPRESSION_THRESHOLD;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the listener binds to
    pub address: String,
    /// Maximum number of concurrently registered players
    pub max_players: usize,
    /// Text shown in the server list
    pub motd: String,
    /// Threshold announced after login
    pub compression_threshold: u32,
    /// Capacity of each session's outbound queue
    pub session_queue_size: usize,
    /// Capacity of the hub mailbox
    pub hub_queue_size: usize,
    pub keep_alive_interval: Duration,
    pub time_update_interval: Duration,
}

impl ServerConfig {
    pub fn new(address: impl Into<String>, max_players: usize) -> Self {
        Self {
            address: address.into(),
            max_players,
            ..Self::default()
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0:25565".to_string(),
            max_players: 20,
            motd: "Awesomeness".to_string(),
            compression_threshold: DEFAULT_COMPRESSION_THRESHOLD,
            session_queue_size: 256,
            hub_queue_size: 256,
            keep_alive_interval: Duration::from_secs(10),
            time_update_interval: Duration::from_secs(1),
        }
    }
}
