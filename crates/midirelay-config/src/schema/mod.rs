//! Configuration schema types for midirelay.
//!
//! All structs use `serde(default)` so partial configs work correctly.

mod client;
mod server;
mod system;

pub use client::*;
pub use server::*;
pub use system::*;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RelayConfig {
    pub server: ServerConfig,
    pub client: ClientConfig,
    pub logging: LoggingConfig,
}

// =============================================================================
// Tests
// =============================================================================
