use serde::{Deserialize, Serialize};

/// Well-known port used for local development, on both ends of the relay.
pub const DEFAULT_PORT: u16 = 8080;

/// Listener configuration for the relay server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind.
    pub bind_host: String,
    /// TCP port to accept WebSocket connections on.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".into(),
            port: DEFAULT_PORT,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }
}
