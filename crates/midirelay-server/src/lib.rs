//! midirelay server: accepts WebSocket connections from any number of note
//! producers and dispatches every decoded event into one shared
//! [`EventRouter`](midirelay_common::EventRouter).

mod connection;
mod session;

pub use connection::handle_connection;
pub use session::{RelayServer, ServerHandle};
