//! Runtime tunables for the connection layer. `tether-daemon` builds one
//! of these from its CLI/env configuration; nothing here reads the environment directly.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub ping_interval: Duration,
    pub pong_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_message_size: usize,
    pub max_connections: usize,
    pub max_connections_per_ip: usize,
    pub connections_per_ip_rate: u32,
    /// Empty means "allow every origin" — useful for local/dev use where no browser
    /// client is involved, tightened by deployments that front this with a browser UI.
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(5 * 60),
            max_message_size: 1024 * 1024,
            max_connections: 100,
            max_connections_per_ip: 10,
            connections_per_ip_rate: 60,
            allowed_origins: Vec::new(),
        }
    }
}
