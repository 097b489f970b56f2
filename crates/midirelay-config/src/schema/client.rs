use serde::{Deserialize, Serialize};

/// Where a producer or listener connects to.
///
/// Unset fields are resolved at connect time: the host falls back to
/// `localhost`, loopback hosts use plain `ws://` on the dev port, and every
/// other host uses `wss://`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ClientConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Force `wss://` (`true`) or `ws://` (`false`) regardless of host.
    pub secure: Option<bool>,
}
