use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Failure to turn a wire frame into an [`Envelope`](crate::Envelope).
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("frame has no event field")]
    MissingEvent,

    #[error("frame has an empty event name")]
    EmptyEvent,

    #[error("frame is not valid utf-8")]
    NotUtf8,
}

/// Failure to convert an envelope payload into a typed note event.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NoteError {
    #[error("note {0} is outside the keyboard range 0-87")]
    NoteOutOfRange(i64),

    #[error("midi note {0} has no key on an 88-key keyboard")]
    MidiNoteOutOfRange(u8),

    #[error("velocity {0} is outside 0-127")]
    VelocityOutOfRange(i64),

    #[error("not a note event: {0}")]
    UnknownEvent(String),

    #[error("invalid note payload: {0}")]
    InvalidData(String),
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Note(#[from] NoteError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
