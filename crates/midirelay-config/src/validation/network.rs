//! Validation for the server listener and client target sections.

use crate::schema::RelayConfig;

use super::helpers::{validate_not_blank, validate_range};

pub(crate) fn validate_server(errors: &mut Vec<String>, config: &RelayConfig) {
    validate_not_blank(errors, "server.bind_host", &config.server.bind_host);
    validate_range(errors, "server.port", config.server.port.into(), 1, 65535);
}

pub(crate) fn validate_client(errors: &mut Vec<String>, config: &RelayConfig) {
    if let Some(host) = &config.client.host {
        validate_not_blank(errors, "client.host", host);
    }
    if let Some(port) = config.client.port {
        validate_range(errors, "client.port", port.into(), 1, 65535);
    }
}
