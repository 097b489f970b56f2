//! Name-addressed dispatch of decoded envelopes.
//!
//! One handler per event name; registering again replaces the previous one.
//! Lookups hold the registry lock only long enough to clone the handler, so
//! connection tasks can dispatch concurrently and handlers run unlocked.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::envelope::Envelope;
use crate::note::{events, NoteEvent};

/// A registered event handler.
pub type Handler = Arc<dyn Fn(Value) + Send + Sync>;

/// Thread-safe event name -> handler table.
#[derive(Clone, Default)]
pub struct EventRouter {
    handlers: Arc<RwLock<HashMap<String, Handler>>>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `event`, replacing any earlier registration.
    pub fn on<F>(&self, event: &str, handler: F)
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        if event.trim().is_empty() {
            warn!("Ignoring handler registration with an empty event name");
            return;
        }
        let mut map = self
            .handlers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if map.insert(event.to_string(), Arc::new(handler)).is_some() {
            debug!(event = %event, "Replaced existing handler");
        }
    }

    /// Register one handler for both note events.
    ///
    /// Payloads that do not validate as notes are logged and dropped.
    pub fn on_note<F>(&self, handler: F)
    where
        F: Fn(NoteEvent) + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        for name in [events::NOTE_ON, events::NOTE_OFF] {
            let handler = Arc::clone(&handler);
            self.on(name, move |data| match NoteEvent::from_event(name, &data) {
                Ok(note) => handler(note),
                Err(e) => warn!(event = %name, error = %e, "Dropping invalid note payload"),
            });
        }
    }

    /// Route `event` payloads into a channel instead of a callback.
    pub fn subscribe(&self, event: &str) -> mpsc::UnboundedReceiver<Value> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.on(event, move |data| {
            let _ = tx.send(data);
        });
        rx
    }

    /// Route validated note events into a channel.
    pub fn subscribe_notes(&self) -> mpsc::UnboundedReceiver<NoteEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.on_note(move |note| {
            let _ = tx.send(note);
        });
        rx
    }

    /// Invoke the handler for `event`, if any. Returns whether one ran.
    pub fn dispatch(&self, event: &str, data: Value) -> bool {
        let handler = {
            let map = self
                .handlers
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            map.get(event).cloned()
        };

        match handler {
            Some(handler) => {
                handler(data);
                true
            }
            None => {
                debug!(event = %event, "No handler registered");
                false
            }
        }
    }

    /// Decode a text frame and dispatch it. Malformed frames are logged and dropped.
    pub fn deliver(&self, frame: &str) -> bool {
        match Envelope::decode(frame) {
            Ok(envelope) => self.dispatch(&envelope.event, envelope.data),
            Err(e) => {
                warn!(error = %e, "Dropping malformed frame");
                false
            }
        }
    }

    /// Decode a binary frame holding UTF-8 JSON and dispatch it.
    pub fn deliver_bytes(&self, frame: &[u8]) -> bool {
        match Envelope::decode_bytes(frame) {
            Ok(envelope) => self.dispatch(&envelope.event, envelope.data),
            Err(e) => {
                warn!(error = %e, "Dropping malformed binary frame");
                false
            }
        }
    }

    pub fn has_handler(&self, event: &str) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains_key(event)
    }

    /// Number of registered event names.
    pub fn len(&self) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let map = self
            .handlers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut names: Vec<&String> = map.keys().collect();
        names.sort();
        f.debug_struct("EventRouter").field("events", &names).finish()
    }
}
