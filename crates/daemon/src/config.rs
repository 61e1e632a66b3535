//! CLI/env configuration: every key is a `clap` flag with a matching
//! `#[arg(env = ...)]` fallback, mirroring how this codebase's daemon resolves
//! environment-first configuration.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

fn parse_duration_secs(s: &str) -> Result<Duration, String> {
    s.parse::<u64>().map(Duration::from_secs).map_err(|e| e.to_string())
}

#[derive(Debug, Clone, Parser)]
#[command(name = "tetherd", about = "WebSocket front end for a local coding-agent CLI")]
pub struct Config {
    /// Address (and port) to listen on, e.g. `127.0.0.1:8787`.
    #[arg(long, env = "TETHER_LISTEN_ADDR", default_value = "127.0.0.1:8787")]
    pub listen_addr: String,

    /// TLS certificate path. When absent the daemon serves plain TCP; pairing this with
    /// `listen_tls_key` is expected to be fronted by a reverse proxy in the meantime (see
    /// DESIGN.md — no TLS crate is part of this stack).
    #[arg(long, env = "TETHER_LISTEN_TLS_CERT")]
    pub listen_tls_cert: Option<PathBuf>,

    #[arg(long, env = "TETHER_LISTEN_TLS_KEY")]
    pub listen_tls_key: Option<PathBuf>,

    /// Root directory for project metadata and message logs.
    #[arg(long, env = "TETHER_DATA_DIR")]
    pub data_dir: PathBuf,

    /// Path (or bare name resolved via `PATH`) to the agent CLI binary.
    #[arg(long, env = "TETHER_AGENT_PATH", default_value = "claude")]
    pub agent_path: PathBuf,

    #[arg(long, env = "TETHER_MAX_PROJECTS", default_value_t = 100)]
    pub max_projects: usize,

    #[arg(long, env = "TETHER_MAX_CONNECTIONS", default_value_t = 100)]
    pub max_connections: usize,

    #[arg(long, env = "TETHER_MAX_CONNECTIONS_PER_IP", default_value_t = 10)]
    pub max_connections_per_ip: usize,

    #[arg(long, env = "TETHER_CONNECTIONS_PER_IP_RATE", default_value_t = 60)]
    pub connections_per_ip_rate: u32,

    #[arg(long, env = "TETHER_PING_INTERVAL_SECS", value_parser = parse_duration_secs, default_value = "30")]
    pub ping_interval: Duration,

    #[arg(long, env = "TETHER_PONG_TIMEOUT_SECS", value_parser = parse_duration_secs, default_value = "10")]
    pub pong_timeout: Duration,

    #[arg(long, env = "TETHER_IDLE_TIMEOUT_SECS", value_parser = parse_duration_secs, default_value = "300")]
    pub idle_timeout: Duration,

    #[arg(long, env = "TETHER_EXECUTION_TIMEOUT_SECS", value_parser = parse_duration_secs, default_value = "300")]
    pub execution_timeout: Duration,

    #[arg(long, env = "TETHER_MAX_CONCURRENT_EXECUTIONS", default_value_t = 10)]
    pub max_concurrent_executions: usize,

    /// How long shutdown waits for in-flight executions and connections to drain before
    /// returning anyway.
    #[arg(long, env = "TETHER_SHUTDOWN_GRACE_SECS", value_parser = parse_duration_secs, default_value = "30")]
    pub shutdown_grace: Duration,

    /// Comma-separated list of allowed WebSocket origins. `*` (the default) permits any.
    #[arg(long, env = "TETHER_ALLOWED_ORIGINS", default_value = "*", value_delimiter = ',')]
    pub allowed_origins: Vec<String>,

    #[arg(long, env = "TETHER_LOG_ROTATE_SIZE", default_value_t = 100 * 1024 * 1024)]
    pub log_rotate_size: u64,

    #[arg(long, env = "TETHER_LOG_ROTATE_ENTRIES", default_value_t = 10_000)]
    pub log_rotate_entries: u64,

    #[arg(long, env = "TETHER_LOG_FORMAT", default_value = "pretty")]
    pub log_format: LogFormat,

    /// Optional rolling file sink under `<data_dir>/logs/daemon.log`; stderr logging
    /// always runs alongside it.
    #[arg(long, env = "TETHER_LOG_FILE")]
    pub log_file: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("pong_timeout ({pong_timeout:?}) must be shorter than ping_interval ({ping_interval:?})")]
    PongTimeoutTooLong { pong_timeout: Duration, ping_interval: Duration },
    #[error("max_connections_per_ip ({per_ip}) must not exceed max_connections ({total})")]
    PerIpExceedsTotal { per_ip: usize, total: usize },
}

impl Config {
    /// Reject combinations that are individually well-formed but jointly nonsensical,
    /// before any resource is opened.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pong_timeout >= self.ping_interval {
            return Err(ConfigError::PongTimeoutTooLong {
                pong_timeout: self.pong_timeout,
                ping_interval: self.ping_interval,
            });
        }
        if self.max_connections_per_ip > self.max_connections {
            return Err(ConfigError::PerIpExceedsTotal {
                per_ip: self.max_connections_per_ip,
                total: self.max_connections,
            });
        }
        Ok(())
    }

    pub fn server_config(&self) -> tether_server::ServerConfig {
        let allowed_origins = if self.allowed_origins.iter().any(|o| o == "*") {
            Vec::new()
        } else {
            self.allowed_origins.clone()
        };
        tether_server::ServerConfig {
            ping_interval: self.ping_interval,
            pong_timeout: self.pong_timeout,
            idle_timeout: self.idle_timeout,
            max_message_size: 1024 * 1024,
            max_connections: self.max_connections,
            max_connections_per_ip: self.max_connections_per_ip,
            connections_per_ip_rate: self.connections_per_ip_rate,
            allowed_origins,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
