//! Resolve a client config into a WebSocket URL.
//!
//! Secure transport unless the host is loopback; loopback targets use plain
//! `ws://` and fall back to the local development port.

use std::fmt;
use std::net::IpAddr;

use midirelay_common::ConfigError;
use midirelay_config::{ClientConfig, DEFAULT_PORT};

/// Host used when the config does not name one.
pub const DEFAULT_HOST: &str = "localhost";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Ws,
    Wss,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ws => "ws",
            Self::Wss => "wss",
        }
    }
}

/// A fully resolved connection target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub scheme: Scheme,
    pub host: String,
    pub port: Option<u16>,
}

impl Target {
    /// Apply defaults and the transport-selection policy to `config`.
    pub fn resolve(config: &ClientConfig) -> Result<Self, ConfigError> {
        let host = config.host.as_deref().unwrap_or(DEFAULT_HOST).trim();
        if host.is_empty() {
            return Err(ConfigError::ValidationError(
                "a host must be provided to connect to the relay".into(),
            ));
        }

        let loopback = is_loopback(host);
        let scheme = match config.secure {
            Some(true) => Scheme::Wss,
            Some(false) => Scheme::Ws,
            None if loopback => Scheme::Ws,
            None => Scheme::Wss,
        };
        let port = match config.port {
            Some(port) => Some(port),
            None if loopback => Some(DEFAULT_PORT),
            None => None,
        };

        Ok(Self {
            scheme,
            host: host.to_string(),
            port,
        })
    }

    pub fn url(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bare = self.host.trim_start_matches('[').trim_end_matches(']');
        let host = match bare.parse::<IpAddr>() {
            Ok(IpAddr::V6(_)) => format!("[{bare}]"),
            _ => self.host.clone(),
        };
        match self.port {
            Some(port) => write!(f, "{}://{host}:{port}", self.scheme.as_str()),
            None => write!(f, "{}://{host}", self.scheme.as_str()),
        }
    }
}

/// `localhost`, `*.localhost`, or any loopback IP literal.
pub fn is_loopback(host: &str) -> bool {
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.eq_ignore_ascii_case("localhost") || host.to_ascii_lowercase().ends_with(".localhost")
    {
        return true;
    }
    host.parse::<IpAddr>().map(|ip| ip.is_loopback()).unwrap_or(false)
}
