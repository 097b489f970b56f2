//! midirelay-send: command-line producer for a midirelay server.

mod cli;

use std::process::ExitCode;
use std::time::Duration;

use midirelay_client::RelayClient;
use midirelay_common::{DecodeError, KeyIndex, NoteEvent};
use midirelay_config::RelayConfig;
use tracing_subscriber::EnvFilter;

use crate::cli::Command;

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::parse();

    let loaded = midirelay_config::load_config(args.config.as_deref());
    let level = args.log_level.clone().unwrap_or_else(|| {
        loaded
            .as_ref()
            .map(|c| c.logging.level.as_directive().to_string())
            .unwrap_or_else(|_| "info".into())
    });
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new(format!("midirelay_client={level},midirelay_common={level}"))
            }),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match loaded {
        Ok(config) => config,
        Err(e) if args.config.is_some() => {
            tracing::error!("Failed to load config: {e}");
            return ExitCode::FAILURE;
        }
        Err(e) => {
            tracing::warn!("Config load failed, using defaults: {e}");
            RelayConfig::default()
        }
    };

    let target = args.client_config(&config.client);
    let client = RelayClient::new();

    // Everything sent before the connection opens is queued and flushed.
    let tap_key = match queue_command(&client, &args.command) {
        Ok(tap_key) => tap_key,
        Err(e) => {
            tracing::error!("Invalid command: {e}");
            return ExitCode::FAILURE;
        }
    };

    let Some(ready) = client.connect(&target) else {
        return ExitCode::FAILURE;
    };
    match tokio::time::timeout(Duration::from_secs(args.connect_timeout), ready).await {
        Ok(Ok(())) => {}
        Ok(Err(_)) => {
            tracing::error!("Could not connect to the relay");
            return ExitCode::FAILURE;
        }
        Err(_) => {
            tracing::error!(
                "Connection did not open within {}s",
                args.connect_timeout
            );
            return ExitCode::FAILURE;
        }
    }

    if let Some(key) = tap_key {
        client.tap(key).await;
    }

    client.close();
    if tokio::time::timeout(Duration::from_secs(5), client.closed())
        .await
        .is_err()
    {
        tracing::warn!("Relay did not acknowledge close");
    }
    ExitCode::SUCCESS
}

/// Queue the sends for `command`. Returns the key to tap, if any.
fn queue_command(
    client: &RelayClient,
    command: &Command,
) -> midirelay_common::Result<Option<KeyIndex>> {
    match command {
        Command::NoteOn { note, velocity } => {
            client.send_note(NoteEvent::note_on(*note, *velocity)?);
            Ok(None)
        }
        Command::NoteOff { note } => {
            client.send_note(NoteEvent::note_off(*note)?);
            Ok(None)
        }
        Command::Tap { note } => Ok(Some(KeyIndex::new(*note)?)),
        Command::Raw { event, data } => {
            let data: serde_json::Value = serde_json::from_str(data).map_err(DecodeError::from)?;
            client.send(event, data);
            Ok(None)
        }
    }
}
