//! midirelay configuration.
//!
//! TOML-based configuration for the relay server and its clients. Every
//! section uses serde defaults, so an empty or partial file is valid.
//!
//! ```rust,no_run
//! use midirelay_config::{config_to_json, load_config};
//!
//! let config = load_config(None).expect("failed to load config");
//! println!("{}", config_to_json(&config));
//! ```

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{ClientConfig, LogLevel, LoggingConfig, RelayConfig, ServerConfig, DEFAULT_PORT};

use std::path::Path;

use midirelay_common::ConfigError;

/// Load config from `path`, or from the platform default location.
///
/// An explicit path must exist. The default location is created with a
/// commented template on first use.
pub fn load_config(path: Option<&Path>) -> Result<RelayConfig, ConfigError> {
    match path {
        Some(path) => {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path.to_path_buf()));
            }
            toml_loader::load_from_path(path)
        }
        None => toml_loader::load_default(),
    }
}

/// Serialize a config to a pretty-printed JSON string.
pub fn config_to_json(config: &RelayConfig) -> String {
    serde_json::to_string_pretty(config)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize config: {e}\"}}"))
}
