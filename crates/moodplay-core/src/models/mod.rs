//! Moodplay data models.
//!
//! Tracks are immutable once classified. Transport state, commands and
//! snapshots are plain serde types so any UI layer can exchange them.

pub mod playback;
pub mod track;

pub use playback::{PlaybackCommand, PlaybackEvent, PlaybackSnapshot, PlaybackState};
pub use track::{Track, TrackKind};
