//! Typed note events for an 88-key keyboard.
//!
//! The wire keeps string event names (`noteOn` / `noteOff`); everything past
//! the decode boundary works with [`NoteEvent`].

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::envelope::Envelope;
use crate::errors::NoteError;

/// Event names used on the wire.
pub mod events {
    pub const NOTE_ON: &str = "noteOn";
    pub const NOTE_OFF: &str = "noteOff";
}

/// Number of keys on the keyboard.
pub const KEY_COUNT: u8 = 88;

/// MIDI note number of the lowest key (A0).
pub const LOWEST_MIDI_NOTE: u8 = 21;

pub const MAX_VELOCITY: u8 = 127;

/// Zero-based key position, `0` is A0 and `87` is C8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyIndex(u8);

impl KeyIndex {
    pub fn new(index: u8) -> Result<Self, NoteError> {
        if index < KEY_COUNT {
            Ok(Self(index))
        } else {
            Err(NoteError::NoteOutOfRange(index.into()))
        }
    }

    pub fn from_midi_note(midi_note: u8) -> Result<Self, NoteError> {
        midi_note
            .checked_sub(LOWEST_MIDI_NOTE)
            .filter(|index| *index < KEY_COUNT)
            .map(Self)
            .ok_or(NoteError::MidiNoteOutOfRange(midi_note))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn to_midi_note(self) -> u8 {
        self.0 + LOWEST_MIDI_NOTE
    }

    /// Whether this key is a sharp/flat.
    pub fn is_black(self) -> bool {
        matches!(self.to_midi_note() % 12, 1 | 3 | 6 | 8 | 10)
    }
}

impl fmt::Display for KeyIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Map a 0-127 velocity onto a 0.0-1.0 playback volume.
pub fn velocity_to_volume(velocity: u8) -> f32 {
    f32::from(velocity.min(MAX_VELOCITY)) / f32::from(MAX_VELOCITY)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteEvent {
    NoteOn { note: KeyIndex, velocity: u8 },
    NoteOff { note: KeyIndex },
}

/// Loose shape of a note payload, validated into a [`NoteEvent`].
#[derive(Deserialize)]
struct RawNote {
    note: i64,
    #[serde(default)]
    velocity: i64,
}

impl NoteEvent {
    pub fn note_on(note: u8, velocity: u8) -> Result<Self, NoteError> {
        if velocity > MAX_VELOCITY {
            return Err(NoteError::VelocityOutOfRange(velocity.into()));
        }
        Ok(Self::NoteOn {
            note: KeyIndex::new(note)?,
            velocity,
        })
    }

    pub fn note_off(note: u8) -> Result<Self, NoteError> {
        Ok(Self::NoteOff {
            note: KeyIndex::new(note)?,
        })
    }

    /// Translate a MIDI channel note message.
    ///
    /// A note-on with velocity zero is a note-off, as in running-status MIDI.
    pub fn from_midi(midi_note: u8, velocity: u8, note_on: bool) -> Result<Self, NoteError> {
        let note = KeyIndex::from_midi_note(midi_note)?;
        if velocity > MAX_VELOCITY {
            return Err(NoteError::VelocityOutOfRange(velocity.into()));
        }
        if note_on && velocity > 0 {
            Ok(Self::NoteOn { note, velocity })
        } else {
            Ok(Self::NoteOff { note })
        }
    }

    pub fn key(&self) -> KeyIndex {
        match self {
            Self::NoteOn { note, .. } | Self::NoteOff { note } => *note,
        }
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            Self::NoteOn { .. } => events::NOTE_ON,
            Self::NoteOff { .. } => events::NOTE_OFF,
        }
    }

    /// Wire payload. `noteOff` always carries velocity 0.
    pub fn data(&self) -> Value {
        match self {
            Self::NoteOn { note, velocity } => json!({ "note": note.get(), "velocity": velocity }),
            Self::NoteOff { note } => json!({ "note": note.get(), "velocity": 0 }),
        }
    }

    pub fn to_envelope(&self) -> Envelope {
        Envelope::new(self.event_name(), self.data())
    }

    /// Validate a payload received under `event`.
    pub fn from_event(event: &str, data: &Value) -> Result<Self, NoteError> {
        let is_on = match event {
            events::NOTE_ON => true,
            events::NOTE_OFF => false,
            other => return Err(NoteError::UnknownEvent(other.to_string())),
        };

        let raw = RawNote::deserialize(data).map_err(|e| NoteError::InvalidData(e.to_string()))?;
        let note = u8::try_from(raw.note)
            .ok()
            .and_then(|n| KeyIndex::new(n).ok())
            .ok_or(NoteError::NoteOutOfRange(raw.note))?;

        if is_on {
            let velocity = u8::try_from(raw.velocity)
                .ok()
                .filter(|v| *v <= MAX_VELOCITY)
                .ok_or(NoteError::VelocityOutOfRange(raw.velocity))?;
            Ok(Self::NoteOn { note, velocity })
        } else {
            Ok(Self::NoteOff { note })
        }
    }
}

impl TryFrom<&Envelope> for NoteEvent {
    type Error = NoteError;

    fn try_from(envelope: &Envelope) -> Result<Self, Self::Error> {
        Self::from_event(&envelope.event, &envelope.data)
    }
}

impl fmt::Display for NoteEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoteOn { note, velocity } => write!(f, "noteOn key={note} velocity={velocity}"),
            Self::NoteOff { note } => write!(f, "noteOff key={note}"),
        }
    }
}
