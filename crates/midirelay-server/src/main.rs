//! midirelay: WebSocket relay for MIDI note events.
//!
//! Accepts WebSocket connections from note producers (a MIDI bridge, a
//! browser page, `midirelay-send`) and dispatches every `noteOn`/`noteOff`
//! they send to the listeners registered in this process.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use midirelay_common::{velocity_to_volume, EventRouter, NoteEvent};
use midirelay_config::RelayConfig;
use midirelay_server::RelayServer;
use tokio::sync::watch;

#[derive(Parser)]
#[command(name = "midirelay", version, about = "WebSocket relay for MIDI note events")]
struct Args {
    /// Port to listen on (overrides the config file).
    #[arg(short, long)]
    port: Option<u16>,

    /// Interface to bind (overrides the config file).
    #[arg(long)]
    host: Option<String>,

    /// Config file path override.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level override (debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let loaded = midirelay_config::load_config(args.config.as_deref());
    let level = args.log_level.clone().unwrap_or_else(|| {
        loaded
            .as_ref()
            .map(|c| c.logging.level.as_directive().to_string())
            .unwrap_or_else(|_| "info".into())
    });
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("midirelay={level},midirelay_server={level},midirelay_common={level}")
                    .into()
            }),
        )
        .init();

    let mut config = match loaded {
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
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host {
        config.server.bind_host = host;
    }

    let router = EventRouter::new();
    router.on_note(log_note);

    let server = match RelayServer::from_config(&config.server, router).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(addr = %config.server.bind_addr(), error = %e, "Failed to bind");
            return ExitCode::FAILURE;
        }
    };
    match server.local_addr() {
        Ok(addr) => tracing::info!("midirelay listening on {}", addr),
        Err(e) => tracing::warn!(error = %e, "Listening on an unknown address"),
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Interrupt received, shutting down");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cannot listen for Ctrl-C");
                // Keep the sender alive so the server keeps running.
                std::future::pending::<()>().await;
            }
        }
    });

    server.run(shutdown_rx).await;
    tracing::info!("Shutdown complete");
    ExitCode::SUCCESS
}

/// Default listener: log every note that passes through the relay.
fn log_note(note: NoteEvent) {
    match note {
        NoteEvent::NoteOn { note, velocity } => tracing::info!(
            key = %note,
            midi = note.to_midi_note(),
            black = note.is_black(),
            volume = velocity_to_volume(velocity),
            "noteOn"
        ),
        NoteEvent::NoteOff { note } => tracing::info!(
            key = %note,
            midi = note.to_midi_note(),
            "noteOff"
        ),
    }
}
