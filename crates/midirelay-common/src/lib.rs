pub mod envelope;
pub mod errors;
pub mod id;
pub mod note;
pub mod router;
pub mod state;

pub use envelope::Envelope;
pub use errors::{ConfigError, DecodeError, NoteError, RelayError};
pub use id::ConnectionId;
pub use note::{events, velocity_to_volume, KeyIndex, NoteEvent, KEY_COUNT};
pub use router::{EventRouter, Handler};
pub use state::ConnectionState;

pub type Result<T> = std::result::Result<T, RelayError>;
