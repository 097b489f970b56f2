//! Full configuration validation.
//!
//! Each section has its own check; this orchestrator runs them all and
//! collects every problem into a single `ConfigError`.

mod helpers;
mod network;


use crate::schema::RelayConfig;
use midirelay_common::ConfigError;

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &RelayConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    network::validate_server(&mut errors, config);
    network::validate_client(&mut errors, config);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}
