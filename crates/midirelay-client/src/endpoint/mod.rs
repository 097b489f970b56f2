//! Client-side transport endpoint.
//!
//! A [`RelayClient`] owns one WebSocket connection, its [`ConnectionState`]
//! and the queue of packets sent before the connection opened. Socket I/O
//! runs in background tasks; the handle itself never blocks.
//!
//! [`ConnectionState`]: midirelay_common::ConnectionState

mod client;
mod connection;

pub use client::{RelayClient, TAP_DURATION};
