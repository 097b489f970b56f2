//! Producer/listener side of the MIDI relay.
//!
//! [`RelayClient`] connects to a relay server, queues everything sent before
//! the connection is open, and dispatches inbound events to handlers.

pub mod endpoint;
pub mod outbound;
pub mod target;

pub use endpoint::{RelayClient, TAP_DURATION};
pub use outbound::PendingQueue;
pub use target::{Scheme, Target};
