//! Server configuration.

use std::str::FromStr;
use std::time::Duration;

use parkour_room::{DEFAULT_CHANNEL_SIZE, SessionConfig};
use serde::{Deserialize, Serialize};

/// Everything a [`ParkourServer`](crate::ParkourServer) needs to start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to.
    pub bind_addr: String,

    /// Settings shared by every room this server creates.
    pub session: SessionConfig,

    /// How long a new connection has to send its `Handshake`.
    pub handshake_timeout: Duration,

    /// A connection that sends nothing for this long is dropped. Clients
    /// heartbeat every 6 s, so the default allows four missed beats.
    pub idle_timeout: Duration,

    /// Command queue depth of each room actor.
    pub room_channel_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            session: SessionConfig::default(),
            handshake_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(24),
            room_channel_size: DEFAULT_CHANNEL_SIZE,
        }
    }
}

impl ServerConfig {
    /// Reads overrides from the process environment.
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `HOST` | host part of `bind_addr` (default `0.0.0.0`) |
    /// | `PORT` | port part of `bind_addr` (default `8080`) |
    /// | `PARKOUR_CAPACITY` | `session.capacity` |
    /// | `PARKOUR_ROUND_SECS` | `session.round_duration_secs` |
    ///
    /// Unparsable values are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port: u16 = parse_var(&lookup, "PORT").unwrap_or(8080);
        config.bind_addr = format!("{host}:{port}");

        if let Some(capacity) = parse_var(&lookup, "PARKOUR_CAPACITY") {
            config.session.capacity = capacity;
        }
        if let Some(secs) = parse_var(&lookup, "PARKOUR_ROUND_SECS") {
            config.session.round_duration_secs = secs;
        }
        config.session = config.session.validated();
        config
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable environment variable");
            None
        }
    }
}
