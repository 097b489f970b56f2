use std::path::PathBuf;

use clap::{Parser, Subcommand};
use midirelay_config::ClientConfig;

/// Send note events to a midirelay server.
#[derive(Parser, Debug)]
#[command(name = "midirelay-send", version, about)]
pub struct Args {
    /// Relay host (defaults to localhost).
    #[arg(long)]
    pub host: Option<String>,

    /// Relay port.
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Force wss:// even for loopback hosts.
    #[arg(long, conflicts_with = "insecure")]
    pub secure: bool,

    /// Force ws:// even for remote hosts.
    #[arg(long)]
    pub insecure: bool,

    /// Config file path override.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log level override (debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Seconds to wait for the connection to open.
    #[arg(long, default_value_t = 10)]
    pub connect_timeout: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Press a key.
    NoteOn {
        /// Key index, 0-87.
        #[arg(short, long)]
        note: u8,
        /// Velocity, 0-127.
        #[arg(short, long, default_value_t = 100)]
        velocity: u8,
    },
    /// Release a key.
    NoteOff {
        #[arg(short, long)]
        note: u8,
    },
    /// Press a key at full velocity and release it half a second later.
    Tap {
        #[arg(short, long)]
        note: u8,
    },
    /// Send an arbitrary event with a JSON payload.
    Raw { event: String, data: String },
}

impl Args {
    /// Apply command-line overrides on top of the config file's client section.
    pub fn client_config(&self, base: &ClientConfig) -> ClientConfig {
        let secure = if self.secure {
            Some(true)
        } else if self.insecure {
            Some(false)
        } else {
            base.secure
        };
        ClientConfig {
            host: self.host.clone().or_else(|| base.host.clone()),
            port: self.port.or(base.port),
            secure,
        }
    }
}

pub fn parse() -> Args {
    Args::parse()
}
