//! FIFO buffer for packets sent before the connection is open.

use std::collections::VecDeque;

use tracing::warn;

/// Queue length at which a stuck connection attempt is reported.
pub const PENDING_WARN_THRESHOLD: usize = 1024;

/// Serialized envelopes waiting for the connection to open.
///
/// Filled while the endpoint is connecting and drained exactly once when it
/// opens. After the drain every push is refused, so a packet can never be
/// queued behind a connection that is already live.
#[derive(Debug, Default)]
pub struct PendingQueue {
    packets: VecDeque<String>,
    drained: bool,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a packet. Returns `false` once the queue has been drained.
    pub fn push(&mut self, packet: String) -> bool {
        if self.drained {
            return false;
        }
        self.packets.push_back(packet);
        if self.packets.len() == PENDING_WARN_THRESHOLD {
            warn!(
                queued = self.packets.len(),
                "Outbound queue keeps growing while the connection is not open"
            );
        }
        true
    }

    /// Take every queued packet in insertion order and seal the queue.
    pub fn drain(&mut self) -> Vec<String> {
        self.drained = true;
        self.packets.drain(..).collect()
    }

    /// Drop every queued packet without sending and seal the queue.
    pub fn discard(&mut self) -> usize {
        self.drained = true;
        let dropped = self.packets.len();
        self.packets.clear();
        dropped
    }

    /// Queued packets, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.packets.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn is_drained(&self) -> bool {
        self.drained
    }
}
